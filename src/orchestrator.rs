//! Workflow controller: ties the API client, lifecycle tracker, curation
//! store, and chat session into the operations a frontend drives.
//!
//! **Design**: the controller holds no ambient state — construct one per
//! logical session. It performs no rendering; UI-relevant changes are emitted
//! as `WorkflowEvent`s through the `EventSink` seam so rendering stays a
//! subscriber. Every error is local: a failed operation marks its own
//! document and leaves the controller usable for the next action.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use crate::api::client::{ApiError, DocumentApi};
use crate::api::types::{
    AskRequest, AskVersion, ConversionMode, DocumentStatus, FilePayload, NamespaceBatchReport,
    NamespaceInfo, StageProgress, MAX_NAMESPACE_FILE_BYTES,
};
use crate::chat::{ChatSession, SubmitOutcome};
use crate::config::ClientConfig;
use crate::curation::CurationStore;
use crate::document::{BatchSummary, DocumentRegistry, DocumentStage, LifecycleError, TrackedDocument};
use crate::poll::{PollConcern, PollError, PollVerdict, SessionRegistry};

// ═══════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    StageChanged {
        document_id: String,
        stage: DocumentStage,
    },
    Progress {
        document_id: String,
        percent: u8,
        stage_label: Option<String>,
        estimated_remaining_seconds: Option<u64>,
    },
    UploadFailed {
        file_name: String,
        message: String,
    },
    SuggestionsLoaded {
        document_id: String,
        count: usize,
    },
    BatchCompleted {
        summary: BatchSummary,
    },
}

/// Where workflow events go. Rendering subscribes here.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WorkflowEvent);
}

/// Default sink: drop everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: WorkflowEvent) {}
}

/// A channel sender is a sink; handy for tests and UI bridges.
impl EventSink for tokio::sync::mpsc::UnboundedSender<WorkflowEvent> {
    fn emit(&self, event: WorkflowEvent) {
        let _ = self.send(event);
    }
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The backend reported a terminal processing failure for a document.
    #[error("{0}")]
    Backend(String),

    /// A poll session hit its attempt ceiling; the action can be retried.
    #[error("processing timed out; try again")]
    PollTimeout,

    /// A newer session for the same concern started; these results were
    /// discarded unapplied.
    #[error("superseded by a newer request")]
    Superseded,

    #[error("no approved or edited suggestions to finalize")]
    NothingCurated,

    #[error("no document is ready to query")]
    NoActiveDocument,

    #[error("unknown document: {0}")]
    UnknownDocument(String),

    #[error("no files selected")]
    NoFiles,

    #[error("{file_name}: {reason}")]
    InvalidFile { file_name: String, reason: String },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl From<PollError> for WorkflowError {
    fn from(e: PollError) -> Self {
        match e {
            PollError::TimedOut { .. } => WorkflowError::PollTimeout,
            PollError::Backend(message) => WorkflowError::Backend(message),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Controller
// ═══════════════════════════════════════════════════════════

pub struct WorkflowController {
    api: Arc<dyn DocumentApi>,
    config: ClientConfig,
    sink: Arc<dyn EventSink>,
    registry: DocumentRegistry,
    curation: CurationStore,
    chat: ChatSession,
    sessions: SessionRegistry,
    /// Default target of ask requests: the last document to become usable.
    current_document: Option<String>,
}

impl WorkflowController {
    pub fn new(api: Arc<dyn DocumentApi>, config: ClientConfig) -> Self {
        Self::with_sink(api, config, Arc::new(NullSink))
    }

    pub fn with_sink(
        api: Arc<dyn DocumentApi>,
        config: ClientConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            api,
            config,
            sink,
            registry: DocumentRegistry::new(),
            curation: CurationStore::new(),
            chat: ChatSession::new(),
            sessions: SessionRegistry::new(),
            current_document: None,
        }
    }

    pub fn documents(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn curation(&self) -> &CurationStore {
        &self.curation
    }

    pub fn curation_mut(&mut self) -> &mut CurationStore {
        &mut self.curation
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn current_document(&self) -> Option<&str> {
        self.current_document.as_deref()
    }

    fn emit_stage(&self, document_id: &str, stage: DocumentStage) {
        self.sink.emit(WorkflowEvent::StageChanged {
            document_id: document_id.to_string(),
            stage,
        });
    }

    fn fail_document(&mut self, document_id: &str, message: String) {
        if let Some(doc) = self.registry.by_document_id_mut(document_id) {
            doc.fail(message);
        }
        self.emit_stage(document_id, DocumentStage::Error);
    }

    fn tracked_mut(&mut self, document_id: &str) -> Result<&mut TrackedDocument, WorkflowError> {
        self.registry
            .by_document_id_mut(document_id)
            .ok_or_else(|| WorkflowError::UnknownDocument(document_id.to_string()))
    }

    // ───────────────────────────────────────────────────────
    // Curated ingest: upload → convert → preview
    // ───────────────────────────────────────────────────────

    /// Upload a document, drive its conversion to completion, and fetch the
    /// markdown artifact. On success the document sits in `awaiting_curation`
    /// with its markdown stored, ready for enhancement.
    pub async fn ingest(
        &mut self,
        file: FilePayload,
        mode: ConversionMode,
    ) -> Result<String, WorkflowError> {
        let client_ref = self.registry.add(&file.file_name, file.size_bytes());
        tracing::info!(file = %file.file_name, ?mode, "ingest started");

        let upload = match self.api.upload_pdf(&file).await {
            Ok(response) => response,
            Err(e) => {
                let message = e.to_string();
                self.sink.emit(WorkflowEvent::UploadFailed {
                    file_name: file.file_name.clone(),
                    message: message.clone(),
                });
                if let Some(doc) = self.registry.get_mut(client_ref) {
                    doc.fail(message);
                }
                return Err(e.into());
            }
        };
        let document_id = upload.document_id;

        if let Some(doc) = self.registry.get_mut(client_ref) {
            doc.upload_succeeded(&document_id)?;
        }
        self.emit_stage(&document_id, DocumentStage::Converting);

        if let Err(e) = self.api.start_conversion(&document_id, mode).await {
            self.fail_document(&document_id, e.to_string());
            return Err(e.into());
        }

        self.sessions.begin(PollConcern::Conversion);
        let result = {
            let policy = self.config.conversion_poll.clone();
            let api = Arc::clone(&self.api);
            let sink = Arc::clone(&self.sink);
            let registry = &mut self.registry;
            let fetch_id = document_id.clone();
            let verdict_id = document_id.clone();
            policy
                .run(
                    move || {
                        let api = Arc::clone(&api);
                        let id = fetch_id.clone();
                        async move { api.conversion_progress(&id).await }
                    },
                    move |progress: &StageProgress| {
                        if progress.is_error() {
                            let message = progress
                                .message
                                .clone()
                                .unwrap_or_else(|| "Conversion failed".to_string());
                            return PollVerdict::Failed(message);
                        }
                        if progress.is_complete() {
                            return PollVerdict::Complete;
                        }
                        if let Some(doc) = registry.by_document_id_mut(&verdict_id) {
                            doc.record_progress(progress.percent_points());
                        }
                        sink.emit(WorkflowEvent::Progress {
                            document_id: verdict_id.clone(),
                            percent: progress.percent_points(),
                            stage_label: Some(progress.status.clone()),
                            estimated_remaining_seconds: None,
                        });
                        PollVerdict::Pending
                    },
                )
                .await
        };
        if let Err(e) = result {
            let message = match &e {
                PollError::TimedOut { .. } => "Conversion timed out".to_string(),
                PollError::Backend(m) => m.clone(),
            };
            self.fail_document(&document_id, message);
            return Err(e.into());
        }

        self.tracked_mut(&document_id)?.conversion_complete()?;
        self.emit_stage(&document_id, DocumentStage::Processing);

        let artifact = match self.api.conversion_result(&document_id).await {
            Ok(artifact) => artifact,
            Err(e) => {
                self.fail_document(&document_id, e.to_string());
                return Err(e.into());
            }
        };
        self.tracked_mut(&document_id)?
            .artifact_fetched(artifact.markdown_content)?;
        self.emit_stage(&document_id, DocumentStage::AwaitingCuration);

        self.current_document = Some(document_id.clone());
        Ok(document_id)
    }

    // ───────────────────────────────────────────────────────
    // Enhancement: suggestions + observational progress
    // ───────────────────────────────────────────────────────

    /// Kick off enhancement and poll until the suggestion list is non-empty,
    /// then load it into the curation store. A progress poll runs alongside
    /// purely for event emission and is aborted when suggestions land.
    /// Calling again supersedes the previous run.
    pub async fn enhance(&mut self, document_id: &str) -> Result<usize, WorkflowError> {
        self.tracked_mut(document_id)?.enhancement_started()?;
        self.emit_stage(document_id, DocumentStage::Processing);

        if let Err(e) = self.api.start_enhancement(document_id).await {
            // back to the curation stop so the action can be retried
            if let Some(doc) = self.registry.by_document_id_mut(document_id) {
                doc.suggestions_ready()?;
            }
            self.emit_stage(document_id, DocumentStage::AwaitingCuration);
            return Err(e.into());
        }

        let token = self.sessions.begin(PollConcern::Enhancement);
        self.sessions.begin(PollConcern::Progress);

        let progress_task = tokio::spawn({
            let api = Arc::clone(&self.api);
            let sink = Arc::clone(&self.sink);
            let policy = self.config.progress_poll.clone();
            let id = document_id.to_string();
            async move {
                let fetch_id = id.clone();
                let _ = policy
                    .run(
                        move || {
                            let api = Arc::clone(&api);
                            let id = fetch_id.clone();
                            async move { api.progress(&id).await }
                        },
                        move |progress: &StageProgress| {
                            sink.emit(WorkflowEvent::Progress {
                                document_id: id.clone(),
                                percent: progress.percent_points(),
                                stage_label: Some(progress.status.clone()),
                                estimated_remaining_seconds: None,
                            });
                            if progress.is_complete() {
                                PollVerdict::Complete
                            } else {
                                PollVerdict::Pending
                            }
                        },
                    )
                    .await;
            }
        });

        let result = {
            let policy = self.config.suggestions_poll.clone();
            let api = Arc::clone(&self.api);
            let id = document_id.to_string();
            policy
                .run(
                    move || {
                        let api = Arc::clone(&api);
                        let id = id.clone();
                        async move { api.get_suggestions(&id).await }
                    },
                    |suggestions| {
                        if suggestions.is_empty() {
                            PollVerdict::Pending
                        } else {
                            PollVerdict::Complete
                        }
                    },
                )
                .await
        };
        progress_task.abort();

        if !self.sessions.is_current(token) {
            tracing::debug!(document_id, "enhancement superseded; results discarded");
            return Err(WorkflowError::Superseded);
        }

        match result {
            Ok(suggestions) => {
                let count = suggestions.len();
                self.curation.load(suggestions);
                self.tracked_mut(document_id)?.suggestions_ready()?;
                self.emit_stage(document_id, DocumentStage::AwaitingCuration);
                self.sink.emit(WorkflowEvent::SuggestionsLoaded {
                    document_id: document_id.to_string(),
                    count,
                });
                tracing::info!(document_id, count, "suggestions loaded");
                Ok(count)
            }
            Err(e) => {
                // timeout is not terminal for the document; enhance can rerun
                if let Some(doc) = self.registry.by_document_id_mut(document_id) {
                    doc.suggestions_ready()?;
                }
                self.emit_stage(document_id, DocumentStage::AwaitingCuration);
                Err(e.into())
            }
        }
    }

    // ───────────────────────────────────────────────────────
    // Finalize
    // ───────────────────────────────────────────────────────

    /// Submit the curated suggestions. Requires at least one approved or
    /// edited item.
    pub async fn finalize(&mut self, document_id: &str) -> Result<(), WorkflowError> {
        if !self.curation.can_finalize() {
            return Err(WorkflowError::NothingCurated);
        }
        self.tracked_mut(document_id)?.finalize_started()?;
        self.emit_stage(document_id, DocumentStage::Finalizing);

        let payload = self.curation.curated_payload();
        tracing::info!(document_id, curated = payload.len(), "finalizing");
        match self.api.finalize_document(document_id, &payload).await {
            Ok(()) => {
                self.tracked_mut(document_id)?.finalized()?;
                self.emit_stage(document_id, DocumentStage::Ready);
                self.current_document = Some(document_id.to_string());
                Ok(())
            }
            Err(e) => {
                self.fail_document(document_id, e.to_string());
                Err(e.into())
            }
        }
    }

    // ───────────────────────────────────────────────────────
    // Auto pipeline: single file and batch
    // ───────────────────────────────────────────────────────

    /// Single-shot pipeline: upload, then watch the backend drive all stages
    /// itself until `is_complete` or a reported error.
    pub async fn ingest_auto(&mut self, file: FilePayload) -> Result<String, WorkflowError> {
        let client_ref = self.registry.add(&file.file_name, file.size_bytes());

        let upload = match self.api.upload_auto(&file).await {
            Ok(response) => response,
            Err(e) => {
                let message = e.to_string();
                self.sink.emit(WorkflowEvent::UploadFailed {
                    file_name: file.file_name.clone(),
                    message: message.clone(),
                });
                if let Some(doc) = self.registry.get_mut(client_ref) {
                    doc.fail(message);
                }
                return Err(e.into());
            }
        };
        let document_id = upload.document_id;
        if let Some(doc) = self.registry.get_mut(client_ref) {
            doc.upload_succeeded_auto(&document_id)?;
            doc.markdown_content = upload.markdown_content;
        }
        self.emit_stage(&document_id, DocumentStage::Processing);

        let token = self.sessions.begin(PollConcern::Status);
        let result = {
            let policy = self.config.status_poll.clone();
            let api = Arc::clone(&self.api);
            let sink = Arc::clone(&self.sink);
            let registry = &mut self.registry;
            let fetch_id = document_id.clone();
            let verdict_id = document_id.clone();
            policy
                .run(
                    move || {
                        let api = Arc::clone(&api);
                        let id = fetch_id.clone();
                        async move { api.document_status(&id).await }
                    },
                    move |status: &DocumentStatus| {
                        if let Some(error) = status.latest_error() {
                            return PollVerdict::Failed(error.to_string());
                        }
                        if status.is_complete {
                            return PollVerdict::Complete;
                        }
                        if let Some(doc) = registry.by_document_id_mut(&verdict_id) {
                            doc.record_progress(status.percent_points());
                        }
                        sink.emit(WorkflowEvent::Progress {
                            document_id: verdict_id.clone(),
                            percent: status.percent_points(),
                            stage_label: Some(status.current_stage.clone()),
                            estimated_remaining_seconds: status.estimated_remaining_seconds,
                        });
                        PollVerdict::Pending
                    },
                )
                .await
        };

        if !self.sessions.is_current(token) {
            return Err(WorkflowError::Superseded);
        }
        match result {
            Ok(_) => {
                self.tracked_mut(&document_id)?.pipeline_complete()?;
                self.emit_stage(&document_id, DocumentStage::Ready);
                self.current_document = Some(document_id.clone());
                Ok(document_id)
            }
            Err(e) => {
                let message = match &e {
                    PollError::TimedOut { .. } => "Processing timed out".to_string(),
                    PollError::Backend(m) => m.clone(),
                };
                self.fail_document(&document_id, message);
                Err(e.into())
            }
        }
    }

    /// Batch pipeline: one upload, then a concurrent status poll per
    /// document. A failing document never blocks its siblings; the batch
    /// completes when every document is terminal.
    pub async fn ingest_batch(
        &mut self,
        files: Vec<FilePayload>,
    ) -> Result<BatchSummary, WorkflowError> {
        if files.is_empty() {
            return Err(WorkflowError::NoFiles);
        }
        let client_refs: Vec<Uuid> = files
            .iter()
            .map(|f| self.registry.add(&f.file_name, f.size_bytes()))
            .collect();
        tracing::info!(count = files.len(), "batch ingest started");

        let response = match self.api.upload_batch(&files).await {
            Ok(response) => response,
            Err(e) => {
                let message = e.to_string();
                for client_ref in client_refs {
                    if let Some(doc) = self.registry.get_mut(client_ref) {
                        doc.fail(message.clone());
                    }
                }
                return Err(e.into());
            }
        };

        // backend acknowledges files in upload order
        for (client_ref, entry) in client_refs.iter().zip(&response.documents) {
            if let Some(doc) = self.registry.get_mut(*client_ref) {
                doc.upload_succeeded_auto(&entry.document_id)?;
            }
        }
        for client_ref in client_refs.iter().skip(response.documents.len()) {
            if let Some(doc) = self.registry.get_mut(*client_ref) {
                doc.fail("upload not acknowledged by backend");
            }
        }

        self.sessions.begin(PollConcern::Status);
        let policy = self.config.status_poll.clone();
        let polls = response.documents.iter().map(|entry| {
            let api = Arc::clone(&self.api);
            let sink = Arc::clone(&self.sink);
            let policy = policy.clone();
            let document_id = entry.document_id.clone();
            async move {
                let fetch_id = document_id.clone();
                let verdict_id = document_id.clone();
                let result = policy
                    .run(
                        move || {
                            let api = Arc::clone(&api);
                            let id = fetch_id.clone();
                            async move { api.document_status(&id).await }
                        },
                        move |status: &DocumentStatus| {
                            if let Some(error) = status.latest_error() {
                                return PollVerdict::Failed(error.to_string());
                            }
                            if status.is_complete {
                                return PollVerdict::Complete;
                            }
                            sink.emit(WorkflowEvent::Progress {
                                document_id: verdict_id.clone(),
                                percent: status.percent_points(),
                                stage_label: Some(status.current_stage.clone()),
                                estimated_remaining_seconds: status.estimated_remaining_seconds,
                            });
                            PollVerdict::Pending
                        },
                    )
                    .await;
                (document_id, result)
            }
        });
        let outcomes = join_all(polls).await;

        for (document_id, result) in outcomes {
            match result {
                Ok(_) => {
                    if let Some(doc) = self.registry.by_document_id_mut(&document_id) {
                        doc.pipeline_complete()?;
                    }
                    self.emit_stage(&document_id, DocumentStage::Ready);
                }
                Err(e) => {
                    let message = match &e {
                        PollError::TimedOut { .. } => "Processing timed out".to_string(),
                        PollError::Backend(m) => m.clone(),
                    };
                    self.fail_document(&document_id, message);
                }
            }
        }

        let summary = self.registry.summary();
        if let Some(last_ready) = self.registry.last_ready_document_id() {
            self.current_document = Some(last_ready);
        }
        self.sink.emit(WorkflowEvent::BatchCompleted { summary });
        tracing::info!(?summary, "batch ingest complete");
        Ok(summary)
    }

    // ───────────────────────────────────────────────────────
    // Q&A
    // ───────────────────────────────────────────────────────

    /// Ask against the current document. Delegates to the chat session; a
    /// busy session or empty prompt yields `SubmitOutcome::Ignored`.
    pub async fn ask(
        &mut self,
        prompt: &str,
        version: AskVersion,
        trace: bool,
    ) -> Result<SubmitOutcome, WorkflowError> {
        let document_id = self
            .current_document
            .clone()
            .ok_or(WorkflowError::NoActiveDocument)?;
        let request = AskRequest {
            document_id,
            prompt: prompt.to_string(),
            version,
            trace,
            k: self.config.ask_top_k,
        };
        Ok(self.chat.ask(self.api.as_ref(), request).await)
    }

    // ───────────────────────────────────────────────────────
    // Namespaces
    // ───────────────────────────────────────────────────────

    pub async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>, WorkflowError> {
        Ok(self.api.list_namespaces(true).await?.namespaces)
    }

    /// Upload markdown files into a namespace. Files are validated client
    /// side (markdown extension, size cap); duplicate names are silently
    /// dropped, keeping the first occurrence.
    pub async fn upload_to_namespace(
        &mut self,
        namespace_id: &str,
        files: Vec<FilePayload>,
    ) -> Result<NamespaceBatchReport, WorkflowError> {
        if files.is_empty() {
            return Err(WorkflowError::NoFiles);
        }
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        for file in files {
            if !file.is_markdown() {
                return Err(WorkflowError::InvalidFile {
                    file_name: file.file_name,
                    reason: "only .md/.markdown files are accepted".to_string(),
                });
            }
            if file.size_bytes() > MAX_NAMESPACE_FILE_BYTES {
                return Err(WorkflowError::InvalidFile {
                    file_name: file.file_name,
                    reason: "exceeds the 100 MB size limit".to_string(),
                });
            }
            if seen.insert(file.file_name.clone()) {
                accepted.push(file);
            }
        }
        let report = self
            .api
            .namespace_batch_upload(namespace_id, &accepted)
            .await?;
        tracing::info!(
            namespace_id,
            succeeded = report.files_succeeded,
            failed = report.files_failed,
            "namespace upload finished"
        );
        Ok(report)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
