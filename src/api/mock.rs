//! Scripted in-memory backend for tests.
//!
//! Each endpoint has a FIFO queue of canned results; calls pop the queue in
//! order, and an unscripted call fails loudly so a test never silently polls
//! past its script. Write-side calls (start/finalize/ask) are recorded for
//! assertion.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{ApiError, DocumentApi};
use super::types::*;

#[derive(Default)]
struct MockState {
    upload_pdf: VecDeque<Result<UploadPdfResponse, ApiError>>,
    upload_auto: VecDeque<Result<UploadResponse, ApiError>>,
    upload_batch: VecDeque<Result<BatchUploadResponse, ApiError>>,
    start_conversion: VecDeque<Result<(), ApiError>>,
    conversion_progress: VecDeque<Result<StageProgress, ApiError>>,
    conversion_result: VecDeque<Result<ConversionResult, ApiError>>,
    start_enhancement: VecDeque<Result<(), ApiError>>,
    suggestions: VecDeque<Result<Vec<SuggestionItem>, ApiError>>,
    progress: VecDeque<Result<StageProgress, ApiError>>,
    status: HashMap<String, VecDeque<Result<DocumentStatus, ApiError>>>,
    finalize: VecDeque<Result<(), ApiError>>,
    ask: VecDeque<Result<AskResponse, ApiError>>,
    namespaces: VecDeque<Result<NamespaceListResponse, ApiError>>,
    namespace_upload: VecDeque<Result<NamespaceBatchReport, ApiError>>,

    conversions_started: Vec<(String, ConversionMode)>,
    enhancements_started: Vec<String>,
    finalize_calls: Vec<(String, Vec<SuggestionItem>)>,
    ask_requests: Vec<AskRequest>,
}

#[derive(Default)]
pub struct MockApi {
    state: Mutex<MockState>,
}

fn unscripted(endpoint: &str) -> ApiError {
    ApiError::Http(format!("mock: no scripted response for {endpoint}"))
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    // --- scripting ------------------------------------------------------

    pub fn script_upload_pdf(&self, result: Result<UploadPdfResponse, ApiError>) {
        self.lock().upload_pdf.push_back(result);
    }

    pub fn script_upload_auto(&self, result: Result<UploadResponse, ApiError>) {
        self.lock().upload_auto.push_back(result);
    }

    pub fn script_upload_batch(&self, result: Result<BatchUploadResponse, ApiError>) {
        self.lock().upload_batch.push_back(result);
    }

    pub fn script_start_conversion(&self, result: Result<(), ApiError>) {
        self.lock().start_conversion.push_back(result);
    }

    pub fn script_conversion_progress(&self, result: Result<StageProgress, ApiError>) {
        self.lock().conversion_progress.push_back(result);
    }

    pub fn script_conversion_result(&self, result: Result<ConversionResult, ApiError>) {
        self.lock().conversion_result.push_back(result);
    }

    pub fn script_start_enhancement(&self, result: Result<(), ApiError>) {
        self.lock().start_enhancement.push_back(result);
    }

    pub fn script_suggestions(&self, result: Result<Vec<SuggestionItem>, ApiError>) {
        self.lock().suggestions.push_back(result);
    }

    pub fn script_progress(&self, result: Result<StageProgress, ApiError>) {
        self.lock().progress.push_back(result);
    }

    pub fn script_status(&self, document_id: &str, result: Result<DocumentStatus, ApiError>) {
        self.lock()
            .status
            .entry(document_id.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn script_finalize(&self, result: Result<(), ApiError>) {
        self.lock().finalize.push_back(result);
    }

    pub fn script_ask(&self, result: Result<AskResponse, ApiError>) {
        self.lock().ask.push_back(result);
    }

    pub fn script_namespaces(&self, result: Result<NamespaceListResponse, ApiError>) {
        self.lock().namespaces.push_back(result);
    }

    pub fn script_namespace_upload(&self, result: Result<NamespaceBatchReport, ApiError>) {
        self.lock().namespace_upload.push_back(result);
    }

    // --- recorded calls -------------------------------------------------

    pub fn conversions_started(&self) -> Vec<(String, ConversionMode)> {
        self.lock().conversions_started.clone()
    }

    pub fn enhancements_started(&self) -> Vec<String> {
        self.lock().enhancements_started.clone()
    }

    pub fn finalize_calls(&self) -> Vec<(String, Vec<SuggestionItem>)> {
        self.lock().finalize_calls.clone()
    }

    pub fn ask_requests(&self) -> Vec<AskRequest> {
        self.lock().ask_requests.clone()
    }
}

#[async_trait]
impl DocumentApi for MockApi {
    async fn upload_pdf(&self, _file: &FilePayload) -> Result<UploadPdfResponse, ApiError> {
        self.lock()
            .upload_pdf
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("upload_pdf")))
    }

    async fn upload_auto(&self, _file: &FilePayload) -> Result<UploadResponse, ApiError> {
        self.lock()
            .upload_auto
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("upload_auto")))
    }

    async fn upload_batch(&self, _files: &[FilePayload]) -> Result<BatchUploadResponse, ApiError> {
        self.lock()
            .upload_batch
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("upload_batch")))
    }

    async fn start_conversion(
        &self,
        document_id: &str,
        mode: ConversionMode,
    ) -> Result<(), ApiError> {
        let mut state = self.lock();
        state
            .conversions_started
            .push((document_id.to_string(), mode));
        state
            .start_conversion
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn conversion_progress(&self, _document_id: &str) -> Result<StageProgress, ApiError> {
        self.lock()
            .conversion_progress
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("conversion_progress")))
    }

    async fn conversion_result(&self, _document_id: &str) -> Result<ConversionResult, ApiError> {
        self.lock()
            .conversion_result
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("conversion_result")))
    }

    async fn start_enhancement(&self, document_id: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.enhancements_started.push(document_id.to_string());
        state.start_enhancement.pop_front().unwrap_or(Ok(()))
    }

    async fn get_suggestions(&self, _document_id: &str) -> Result<Vec<SuggestionItem>, ApiError> {
        self.lock()
            .suggestions
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("get_suggestions")))
    }

    async fn progress(&self, _document_id: &str) -> Result<StageProgress, ApiError> {
        // The observational progress poll may outlive its script; report a
        // quiet pending snapshot rather than failing the test.
        self.lock().progress.pop_front().unwrap_or_else(|| {
            Ok(StageProgress {
                status: "running".into(),
                percent: 0.0,
                message: None,
            })
        })
    }

    async fn document_status(&self, document_id: &str) -> Result<DocumentStatus, ApiError> {
        self.lock()
            .status
            .get_mut(document_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Err(unscripted("document_status")))
    }

    async fn finalize_document(
        &self,
        document_id: &str,
        suggestions: &[SuggestionItem],
    ) -> Result<(), ApiError> {
        let mut state = self.lock();
        state
            .finalize_calls
            .push((document_id.to_string(), suggestions.to_vec()));
        state.finalize.pop_front().unwrap_or(Ok(()))
    }

    async fn ask(&self, request: &AskRequest) -> Result<AskResponse, ApiError> {
        let mut state = self.lock();
        state.ask_requests.push(request.clone());
        state
            .ask
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("ask")))
    }

    async fn list_namespaces(&self, _active_only: bool) -> Result<NamespaceListResponse, ApiError> {
        self.lock()
            .namespaces
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("list_namespaces")))
    }

    async fn namespace_batch_upload(
        &self,
        _namespace_id: &str,
        _files: &[FilePayload],
    ) -> Result<NamespaceBatchReport, ApiError> {
        self.lock()
            .namespace_upload
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("namespace_batch_upload")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_pop_in_order() {
        let mock = MockApi::new();
        mock.script_conversion_progress(Ok(StageProgress {
            status: "running".into(),
            percent: 0.5,
            message: None,
        }));
        mock.script_conversion_progress(Ok(StageProgress {
            status: "complete".into(),
            percent: 1.0,
            message: None,
        }));

        let first = mock.conversion_progress("doc").await.unwrap();
        let second = mock.conversion_progress("doc").await.unwrap();
        assert!(!first.is_complete());
        assert!(second.is_complete());
    }

    #[tokio::test]
    async fn unscripted_call_fails_loudly() {
        let mock = MockApi::new();
        let err = mock.conversion_result("doc").await.unwrap_err();
        assert!(err.to_string().contains("no scripted response"));
    }

    #[tokio::test]
    async fn write_calls_are_recorded() {
        let mock = MockApi::new();
        mock.start_conversion("doc-9", ConversionMode::Basic)
            .await
            .unwrap();
        mock.start_enhancement("doc-9").await.unwrap();
        assert_eq!(
            mock.conversions_started(),
            vec![("doc-9".to_string(), ConversionMode::Basic)]
        );
        assert_eq!(mock.enhancements_started(), vec!["doc-9".to_string()]);
    }
}
