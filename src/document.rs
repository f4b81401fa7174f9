//! Per-document lifecycle state machine and the batch registry.
//!
//! A document moves `uploading → converting → processing → awaiting_curation
//! → finalizing → ready`; the auto pipeline skips the curation stop
//! (`uploading → processing → ready`). Any stage can fail into `error`.
//! `ready` and `error` are terminal. Transitions outside the diagram are
//! rejected so a stale callback can never rewind a document.

use serde::Serialize;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════
// Stages
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStage {
    Uploading,
    Converting,
    Processing,
    AwaitingCuration,
    Finalizing,
    Ready,
    Error,
}

impl DocumentStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStage::Ready | DocumentStage::Error)
    }
}

impl std::fmt::Display for DocumentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DocumentStage::Uploading => "uploading",
            DocumentStage::Converting => "converting",
            DocumentStage::Processing => "processing",
            DocumentStage::AwaitingCuration => "awaiting_curation",
            DocumentStage::Finalizing => "finalizing",
            DocumentStage::Ready => "ready",
            DocumentStage::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid document transition: {from} → {to}")]
    InvalidTransition {
        from: DocumentStage,
        to: DocumentStage,
    },
}

// ═══════════════════════════════════════════════════════════
// Tracked document
// ═══════════════════════════════════════════════════════════

/// One document the client is shepherding through the backend pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedDocument {
    /// Client-side identity, assigned at file selection, stable across the
    /// whole lifecycle (the backend id only exists after upload).
    pub client_ref: Uuid,
    /// Backend-assigned id, `None` until the upload response arrives.
    pub document_id: Option<String>,
    pub file_name: String,
    pub file_size_bytes: u64,
    pub stage: DocumentStage,
    /// 0–100, monotonically non-decreasing within a stage.
    pub progress_percent: u8,
    /// Set only in the `error` stage.
    pub error_message: Option<String>,
    /// Converted markdown artifact, once fetched.
    pub markdown_content: Option<String>,
}

impl TrackedDocument {
    pub fn new(file_name: impl Into<String>, file_size_bytes: u64) -> Self {
        Self {
            client_ref: Uuid::new_v4(),
            document_id: None,
            file_name: file_name.into(),
            file_size_bytes,
            stage: DocumentStage::Uploading,
            progress_percent: 0,
            error_message: None,
            markdown_content: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    fn transition(&mut self, to: DocumentStage) -> Result<(), LifecycleError> {
        use DocumentStage::*;
        let allowed = matches!(
            (self.stage, to),
            (Uploading, Converting)
                | (Uploading, Processing)
                | (Converting, Processing)
                | (Processing, AwaitingCuration)
                | (Processing, Ready)
                | (AwaitingCuration, Processing)
                | (AwaitingCuration, Finalizing)
                | (Finalizing, Ready)
        );
        if !allowed {
            return Err(LifecycleError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        tracing::debug!(document = %self.client_ref, from = %self.stage, to = %to, "stage transition");
        self.stage = to;
        Ok(())
    }

    /// Upload response arrived: bind the backend id and enter conversion.
    pub fn upload_succeeded(&mut self, document_id: impl Into<String>) -> Result<(), LifecycleError> {
        self.transition(DocumentStage::Converting)?;
        self.document_id = Some(document_id.into());
        Ok(())
    }

    /// Auto-pipeline upload: backend id bound, processing starts server-side.
    pub fn upload_succeeded_auto(
        &mut self,
        document_id: impl Into<String>,
    ) -> Result<(), LifecycleError> {
        self.transition(DocumentStage::Processing)?;
        self.document_id = Some(document_id.into());
        Ok(())
    }

    /// Conversion reported complete; the artifact fetch runs next.
    pub fn conversion_complete(&mut self) -> Result<(), LifecycleError> {
        self.transition(DocumentStage::Processing)
    }

    /// Markdown artifact fetched; the document is ready for review.
    pub fn artifact_fetched(&mut self, markdown: String) -> Result<(), LifecycleError> {
        self.transition(DocumentStage::AwaitingCuration)?;
        self.markdown_content = Some(markdown);
        self.progress_percent = 100;
        Ok(())
    }

    /// Enhancement kicked off; progress restarts for the new stage.
    pub fn enhancement_started(&mut self) -> Result<(), LifecycleError> {
        self.transition(DocumentStage::Processing)?;
        self.progress_percent = 0;
        Ok(())
    }

    /// Suggestions arrived; back to the curation stop.
    pub fn suggestions_ready(&mut self) -> Result<(), LifecycleError> {
        self.transition(DocumentStage::AwaitingCuration)
    }

    pub fn finalize_started(&mut self) -> Result<(), LifecycleError> {
        self.transition(DocumentStage::Finalizing)
    }

    pub fn finalized(&mut self) -> Result<(), LifecycleError> {
        self.transition(DocumentStage::Ready)?;
        self.progress_percent = 100;
        Ok(())
    }

    /// Auto pipeline finished; curation happened server-side.
    pub fn pipeline_complete(&mut self) -> Result<(), LifecycleError> {
        self.transition(DocumentStage::Ready)?;
        self.progress_percent = 100;
        Ok(())
    }

    /// Terminal failure from any stage. Idempotent; the first message wins.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.stage == DocumentStage::Error {
            return;
        }
        tracing::warn!(document = %self.client_ref, from = %self.stage, "document failed");
        self.stage = DocumentStage::Error;
        self.error_message = Some(message.into());
    }

    /// Record observed progress. Clamped to 100 and never allowed to move
    /// backwards; terminal documents ignore late reports.
    pub fn record_progress(&mut self, percent: u8) {
        if self.is_terminal() {
            return;
        }
        self.progress_percent = self.progress_percent.max(percent.min(100));
    }
}

// ═══════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════

/// All documents of the current workflow, batch or single.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    documents: Vec<TrackedDocument>,
}

/// Join result of a batch: every document terminal, counted by outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub ready: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.ready + self.failed == self.total
    }
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new document; returns its client-side identity.
    pub fn add(&mut self, file_name: impl Into<String>, file_size_bytes: u64) -> Uuid {
        let doc = TrackedDocument::new(file_name, file_size_bytes);
        let client_ref = doc.client_ref;
        self.documents.push(doc);
        client_ref
    }

    pub fn get(&self, client_ref: Uuid) -> Option<&TrackedDocument> {
        self.documents.iter().find(|d| d.client_ref == client_ref)
    }

    pub fn get_mut(&mut self, client_ref: Uuid) -> Option<&mut TrackedDocument> {
        self.documents
            .iter_mut()
            .find(|d| d.client_ref == client_ref)
    }

    pub fn by_document_id(&self, document_id: &str) -> Option<&TrackedDocument> {
        self.documents
            .iter()
            .find(|d| d.document_id.as_deref() == Some(document_id))
    }

    pub fn by_document_id_mut(&mut self, document_id: &str) -> Option<&mut TrackedDocument> {
        self.documents
            .iter_mut()
            .find(|d| d.document_id.as_deref() == Some(document_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedDocument> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Batch join condition: every tracked document is terminal.
    pub fn all_terminal(&self) -> bool {
        !self.documents.is_empty() && self.documents.iter().all(|d| d.is_terminal())
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            total: self.documents.len(),
            ready: self
                .documents
                .iter()
                .filter(|d| d.stage == DocumentStage::Ready)
                .count(),
            failed: self
                .documents
                .iter()
                .filter(|d| d.stage == DocumentStage::Error)
                .count(),
        }
    }

    /// The most recently completed document, used as the default chat target
    /// after a batch.
    pub fn last_ready_document_id(&self) -> Option<String> {
        self.documents
            .iter()
            .rev()
            .find(|d| d.stage == DocumentStage::Ready)
            .and_then(|d| d.document_id.clone())
    }

    pub fn clear(&mut self) {
        self.documents.clear();
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
