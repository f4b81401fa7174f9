//! Wire types for the document backend.
//!
//! Field names mirror the backend's JSON exactly; anything the backend may
//! omit is optional or defaulted so older server builds keep deserializing.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Uploads
// ═══════════════════════════════════════════════════════════

/// An in-memory file queued for upload.
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Client-side cap on namespace upload size.
pub const MAX_NAMESPACE_FILE_BYTES: u64 = 100 * 1024 * 1024;

impl FilePayload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read a file from disk, keeping only its final path component as name.
    pub async fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let bytes = tokio::fs::read(path).await?;
        Ok(Self { file_name, bytes })
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Namespace uploads accept markdown only.
    pub fn is_markdown(&self) -> bool {
        let lower = self.file_name.to_ascii_lowercase();
        lower.ends_with(".md") || lower.ends_with(".markdown")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadPdfResponse {
    pub document_id: String,
    pub file_name: String,
}

/// Response of the single-shot auto pipeline upload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadResponse {
    pub document_id: String,
    #[serde(default)]
    pub markdown_content: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchUploadResponse {
    pub documents: Vec<BatchUploadEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchUploadEntry {
    pub document_id: String,
    pub file_name: String,
}

// ═══════════════════════════════════════════════════════════
// Conversion & progress
// ═══════════════════════════════════════════════════════════

/// Conversion mode selected at ingest time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionMode {
    Basic,
    Smart,
}

/// Snapshot of a running stage. Served by both `/conversion-progress/{id}`
/// and `/progress/{id}`; `percent` is a 0.0–1.0 fraction.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageProgress {
    pub status: String,
    #[serde(default)]
    pub percent: f64,
    #[serde(default)]
    pub message: Option<String>,
}

impl StageProgress {
    pub fn is_complete(&self) -> bool {
        self.status == "complete" || self.percent >= 1.0
    }

    pub fn is_error(&self) -> bool {
        self.status == "error"
    }

    /// Fraction as whole percentage points, clamped to 0–100.
    pub fn percent_points(&self) -> u8 {
        (self.percent * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionResult {
    pub document_id: String,
    pub markdown_content: String,
}

/// Status of a document in the auto pipeline. `progress_percentage` is
/// 0–100, unlike the fractional `StageProgress::percent`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentStatus {
    pub current_stage: String,
    #[serde(default)]
    pub progress_percentage: f64,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub errors: Vec<StageErrorEntry>,
    #[serde(default)]
    pub estimated_remaining_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageErrorEntry {
    pub error: String,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl DocumentStatus {
    /// The most recent pipeline error, if any.
    pub fn latest_error(&self) -> Option<&str> {
        self.errors.last().map(|e| e.error.as_str())
    }

    pub fn percent_points(&self) -> u8 {
        self.progress_percentage.round().clamp(0.0, 100.0) as u8
    }
}

// ═══════════════════════════════════════════════════════════
// Suggestions
// ═══════════════════════════════════════════════════════════

/// Kind of generated suggestion. Unknown wire values fold into `Other` so a
/// newer backend never breaks the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    Glossary,
    Highlight,
    Faq,
    Caption,
    TermToDefine,
    ConceptToSimplify,
    #[serde(other)]
    Other,
}

/// Review status of one suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CurationStatus {
    #[default]
    Pending,
    Approved,
    Edited,
    Rejected,
}

impl CurationStatus {
    /// Approved and edited items make up the curated set.
    pub fn is_curated(self) -> bool {
        matches!(self, CurationStatus::Approved | CurationStatus::Edited)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SuggestionItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SuggestionType,
    #[serde(default)]
    pub original_context: String,
    pub generated_content: String,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub status: CurationStatus,
    #[serde(default)]
    pub source_units: Option<Vec<String>>,
    #[serde(default)]
    pub source_previews: Option<Vec<SourcePreview>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcePreview {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub table_preview: Option<String>,
}

/// Envelope of `/get-suggestions/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestionsResponse {
    pub document_id: String,
    #[serde(default)]
    pub suggestions: Vec<SuggestionItem>,
}

/// Body of `/finalize-document/`.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeRequest<'a> {
    pub document_id: &'a str,
    pub suggestions: &'a [SuggestionItem],
}

// ═══════════════════════════════════════════════════════════
// Q&A
// ═══════════════════════════════════════════════════════════

/// Which retrieval corpus a question is answered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AskVersion {
    V1,
    V2,
    #[default]
    Both,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskRequest {
    pub document_id: String,
    pub prompt: String,
    pub version: AskVersion,
    pub trace: bool,
    pub k: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Some backend builds omit the precomputed total.
    pub fn total(&self) -> u64 {
        if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.input_tokens + self.output_tokens
        }
    }
}

/// One retrieved chunk backing an answer. `score` is a 0.0–1.0 similarity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievedSource {
    pub id: String,
    pub score: f64,
    pub snippet: String,
    #[serde(default)]
    pub metadata: SourceMetadata,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SourceMetadata {
    #[serde(default)]
    pub source_document: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub chunk_id: Option<String>,
    #[serde(default)]
    pub char_start: Option<u64>,
    #[serde(default)]
    pub char_end: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskSingleResponse {
    pub answer: String,
    pub version: AskVersion,
    #[serde(default)]
    pub sources: Vec<RetrievedSource>,
    #[serde(default)]
    pub token_usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskBothResponse {
    pub unenriched_answer: String,
    pub enriched_answer: String,
    #[serde(default)]
    pub unenriched_sources: Vec<RetrievedSource>,
    #[serde(default)]
    pub enriched_sources: Vec<RetrievedSource>,
    #[serde(default)]
    pub unenriched_token_usage: Option<TokenUsage>,
    #[serde(default)]
    pub enriched_token_usage: Option<TokenUsage>,
}

/// `/ask/` returns one of two shapes depending on the requested version.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AskResponse {
    Both(AskBothResponse),
    Single(AskSingleResponse),
}

// ═══════════════════════════════════════════════════════════
// Namespaces
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamespaceInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub document_count: u64,
    #[serde(default)]
    pub total_chunks: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamespaceListResponse {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub active: u64,
    #[serde(default)]
    pub namespaces: Vec<NamespaceInfo>,
}

/// Aggregate report of a namespace batch upload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamespaceBatchReport {
    pub success: bool,
    pub namespace_id: String,
    #[serde(default)]
    pub namespace_name: String,
    #[serde(default)]
    pub files_processed: u64,
    #[serde(default)]
    pub files_succeeded: u64,
    #[serde(default)]
    pub files_failed: u64,
    #[serde(default)]
    pub total_chunks_uploaded: u64,
    #[serde(default)]
    pub total_input_tokens: u64,
    #[serde(default)]
    pub detailed_results: Vec<NamespaceFileResult>,
    #[serde(default)]
    pub namespace_accumulated_stats: Option<NamespaceAccumulatedStats>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamespaceFileResult {
    pub file_name: String,
    pub success: bool,
    #[serde(default)]
    pub chunks_uploaded: u64,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamespaceAccumulatedStats {
    #[serde(default)]
    pub document_count: u64,
    #[serde(default)]
    pub total_chunks: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_progress_complete_by_status_or_fraction() {
        let by_status: StageProgress =
            serde_json::from_str(r#"{"status":"complete","percent":0.4}"#).unwrap();
        assert!(by_status.is_complete());
        let by_fraction: StageProgress =
            serde_json::from_str(r#"{"status":"running","percent":1.0}"#).unwrap();
        assert!(by_fraction.is_complete());
        let pending: StageProgress =
            serde_json::from_str(r#"{"status":"running","percent":0.42}"#).unwrap();
        assert!(!pending.is_complete());
        assert_eq!(pending.percent_points(), 42);
    }

    #[test]
    fn suggestion_defaults_to_pending_and_folds_unknown_kind() {
        let item: SuggestionItem = serde_json::from_str(
            r#"{"id":"s-1","type":"hologram","generated_content":"A 3D projection."}"#,
        )
        .unwrap();
        assert_eq!(item.status, CurationStatus::Pending);
        assert_eq!(item.kind, SuggestionType::Other);
        assert_eq!(item.original_context, "");
    }

    #[test]
    fn suggestion_kind_uses_wire_names() {
        let item: SuggestionItem = serde_json::from_str(
            r#"{"id":"s-2","type":"term_to_define","generated_content":"...","status":"approved"}"#,
        )
        .unwrap();
        assert_eq!(item.kind, SuggestionType::TermToDefine);
        assert!(item.status.is_curated());
    }

    #[test]
    fn ask_response_disambiguates_single_and_both() {
        let single: AskResponse = serde_json::from_str(
            r#"{"answer":"42","version":"v1","prompt":"q","sources":[]}"#,
        )
        .unwrap();
        assert!(matches!(single, AskResponse::Single(_)));

        let both: AskResponse = serde_json::from_str(
            r#"{"prompt":"q","unenriched_answer":"a","enriched_answer":"b",
                "unenriched_sources":[],"enriched_sources":[]}"#,
        )
        .unwrap();
        assert!(matches!(both, AskResponse::Both(_)));
    }

    #[test]
    fn document_status_surfaces_latest_error() {
        let status: DocumentStatus = serde_json::from_str(
            r#"{"current_stage":"ocr_in_progress","progress_percentage":35,
                "is_complete":false,
                "errors":[{"error":"first"},{"error":"OCR engine crashed","stage":"ocr"}]}"#,
        )
        .unwrap();
        assert_eq!(status.latest_error(), Some("OCR engine crashed"));
        assert_eq!(status.percent_points(), 35);
    }

    #[test]
    fn token_usage_total_falls_back_to_sum() {
        let usage = TokenUsage {
            input_tokens: 120,
            output_tokens: 30,
            total_tokens: 0,
        };
        assert_eq!(usage.total(), 150);
    }

    #[tokio::test]
    async fn file_payload_from_path_keeps_final_component_as_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        tokio::fs::write(&path, b"# hi").await.unwrap();

        let payload = FilePayload::from_path(&path).await.unwrap();
        assert_eq!(payload.file_name, "notes.md");
        assert_eq!(payload.bytes, b"# hi");
        assert_eq!(payload.size_bytes(), 4);
        assert!(payload.is_markdown());
    }

    #[test]
    fn markdown_extension_check_is_case_insensitive() {
        assert!(FilePayload::new("Notes.MD", vec![]).is_markdown());
        assert!(FilePayload::new("guide.markdown", vec![]).is_markdown());
        assert!(!FilePayload::new("scan.pdf", vec![]).is_markdown());
    }
}
