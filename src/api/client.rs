//! HTTP client for the document backend.
//!
//! `DocumentApi` is the seam the rest of the crate programs against; the
//! controller takes any implementation, production code wires in `HttpApi`,
//! tests use the scripted [`super::mock::MockApi`].
//!
//! Non-2xx responses carry a JSON `{"detail": "..."}` body; that string is
//! surfaced verbatim as `ApiError::Backend` so the UI can show exactly what
//! the backend said.

use async_trait::async_trait;
use serde::Serialize;

use super::types::*;
use crate::config::ClientConfig;

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Backend unreachable (connection refused, DNS failure).
    #[error("Cannot reach backend at {0}. Is the server running?")]
    Connection(String),

    /// Request exceeded the configured timeout.
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// Non-2xx response; `detail` is the backend's own message, verbatim.
    #[error("{detail}")]
    Backend { status: u16, detail: String },

    /// 2xx response whose body did not match the expected shape.
    #[error("Failed to parse backend response: {0}")]
    ResponseParsing(String),

    /// Any other transport-level failure.
    #[error("HTTP error: {0}")]
    Http(String),
}

// ═══════════════════════════════════════════════════════════
// Trait seam
// ═══════════════════════════════════════════════════════════

/// Every backend operation the workflow controller performs.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn upload_pdf(&self, file: &FilePayload) -> Result<UploadPdfResponse, ApiError>;
    async fn upload_auto(&self, file: &FilePayload) -> Result<UploadResponse, ApiError>;
    async fn upload_batch(&self, files: &[FilePayload]) -> Result<BatchUploadResponse, ApiError>;
    async fn start_conversion(&self, document_id: &str, mode: ConversionMode)
        -> Result<(), ApiError>;
    async fn conversion_progress(&self, document_id: &str) -> Result<StageProgress, ApiError>;
    async fn conversion_result(&self, document_id: &str) -> Result<ConversionResult, ApiError>;
    async fn start_enhancement(&self, document_id: &str) -> Result<(), ApiError>;
    async fn get_suggestions(&self, document_id: &str) -> Result<Vec<SuggestionItem>, ApiError>;
    async fn progress(&self, document_id: &str) -> Result<StageProgress, ApiError>;
    async fn document_status(&self, document_id: &str) -> Result<DocumentStatus, ApiError>;
    async fn finalize_document(
        &self,
        document_id: &str,
        suggestions: &[SuggestionItem],
    ) -> Result<(), ApiError>;
    async fn ask(&self, request: &AskRequest) -> Result<AskResponse, ApiError>;
    async fn list_namespaces(&self, active_only: bool) -> Result<NamespaceListResponse, ApiError>;
    async fn namespace_batch_upload(
        &self,
        namespace_id: &str,
        files: &[FilePayload],
    ) -> Result<NamespaceBatchReport, ApiError>;
}

// ═══════════════════════════════════════════════════════════
// Reqwest implementation
// ═══════════════════════════════════════════════════════════

/// Shape of the backend's error body.
#[derive(Debug, serde::Deserialize)]
struct ErrorDetail {
    detail: String,
}

#[derive(Debug, Serialize)]
struct StartConversionBody<'a> {
    document_id: &'a str,
    mode: ConversionMode,
}

pub struct HttpApi {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ApiError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::new(&config.base_url, config.request_timeout_secs)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_transport(&self, e: reqwest::Error) -> ApiError {
        if e.is_connect() {
            ApiError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            ApiError::Timeout(self.timeout_secs)
        } else {
            ApiError::Http(e.to_string())
        }
    }

    /// Pass 2xx through, turn anything else into `Backend` with the
    /// verbatim `detail` string (or the raw body if there is none).
    async fn checked(&self, response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorDetail>(&body)
            .map(|d| d.detail)
            .unwrap_or_else(|_| {
                if body.is_empty() {
                    format!("Backend returned HTTP {}", status.as_u16())
                } else {
                    body
                }
            });
        Err(ApiError::Backend {
            status: status.as_u16(),
            detail,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        self.checked(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::ResponseParsing(e.to_string()))
    }

    async fn post_multipart<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        self.checked(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::ResponseParsing(e.to_string()))
    }

    fn file_part(file: &FilePayload) -> reqwest::multipart::Part {
        reqwest::multipart::Part::bytes(file.bytes.clone()).file_name(file.file_name.clone())
    }
}

#[async_trait]
impl DocumentApi for HttpApi {
    async fn upload_pdf(&self, file: &FilePayload) -> Result<UploadPdfResponse, ApiError> {
        let form = reqwest::multipart::Form::new().part("file", Self::file_part(file));
        self.post_multipart("/upload-pdf", form).await
    }

    async fn upload_auto(&self, file: &FilePayload) -> Result<UploadResponse, ApiError> {
        let form = reqwest::multipart::Form::new().part("file", Self::file_part(file));
        self.post_multipart("/documents/upload-auto", form).await
    }

    async fn upload_batch(&self, files: &[FilePayload]) -> Result<BatchUploadResponse, ApiError> {
        let mut form = reqwest::multipart::Form::new();
        for file in files {
            form = form.part("files", Self::file_part(file));
        }
        self.post_multipart("/documents/upload-batch", form).await
    }

    async fn start_conversion(
        &self,
        document_id: &str,
        mode: ConversionMode,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/start-conversion"))
            .json(&StartConversionBody { document_id, mode })
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        self.checked(response).await?;
        Ok(())
    }

    async fn conversion_progress(&self, document_id: &str) -> Result<StageProgress, ApiError> {
        self.get_json(&format!("/conversion-progress/{document_id}"))
            .await
    }

    async fn conversion_result(&self, document_id: &str) -> Result<ConversionResult, ApiError> {
        self.get_json(&format!("/conversion-result/{document_id}"))
            .await
    }

    async fn start_enhancement(&self, document_id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/start-enhancement/{document_id}")))
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        self.checked(response).await?;
        Ok(())
    }

    async fn get_suggestions(&self, document_id: &str) -> Result<Vec<SuggestionItem>, ApiError> {
        let envelope: SuggestionsResponse = self
            .get_json(&format!("/get-suggestions/{document_id}"))
            .await?;
        Ok(envelope.suggestions)
    }

    async fn progress(&self, document_id: &str) -> Result<StageProgress, ApiError> {
        self.get_json(&format!("/progress/{document_id}")).await
    }

    async fn document_status(&self, document_id: &str) -> Result<DocumentStatus, ApiError> {
        self.get_json(&format!("/documents/{document_id}/status"))
            .await
    }

    async fn finalize_document(
        &self,
        document_id: &str,
        suggestions: &[SuggestionItem],
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/finalize-document/"))
            .json(&FinalizeRequest {
                document_id,
                suggestions,
            })
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        self.checked(response).await?;
        Ok(())
    }

    async fn ask(&self, request: &AskRequest) -> Result<AskResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/ask/"))
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        self.checked(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::ResponseParsing(e.to_string()))
    }

    async fn list_namespaces(&self, active_only: bool) -> Result<NamespaceListResponse, ApiError> {
        self.get_json(&format!("/namespaces/?active_only={active_only}"))
            .await
    }

    async fn namespace_batch_upload(
        &self,
        namespace_id: &str,
        files: &[FilePayload],
    ) -> Result<NamespaceBatchReport, ApiError> {
        let mut form =
            reqwest::multipart::Form::new().text("namespace_id", namespace_id.to_string());
        for file in files {
            form = form.part("files", Self::file_part(file));
        }
        self.post_multipart("/namespaces/batch-upload", form).await
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let api = HttpApi::new("http://localhost:8000/", 30).unwrap();
        assert_eq!(api.url("/upload-pdf"), "http://localhost:8000/upload-pdf");
    }

    #[test]
    fn error_detail_parses_backend_shape() {
        let detail: ErrorDetail =
            serde_json::from_str(r#"{"detail":"Document not found"}"#).unwrap();
        assert_eq!(detail.detail, "Document not found");
    }

    #[test]
    fn backend_error_displays_detail_verbatim() {
        let err = ApiError::Backend {
            status: 422,
            detail: "Unsupported file type".into(),
        };
        assert_eq!(err.to_string(), "Unsupported file type");
    }

    #[test]
    fn start_conversion_body_serializes_mode() {
        let body = StartConversionBody {
            document_id: "doc-1",
            mode: ConversionMode::Smart,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"document_id":"doc-1","mode":"smart"}"#);
    }
}
