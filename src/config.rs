//! Client configuration: backend location and per-concern poll policies.
//!
//! The backoff constants are tuned against the backend's observed stage
//! durations: conversion finishes in seconds (fixed cadence), enhancement can
//! take minutes (aggressive growth, high cap), and the auto-pipeline status
//! endpoint is cheap enough to poll at a relaxed rate.

use serde::Serialize;

use crate::poll::PollPolicy;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Default backend base URL (local development server).
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Environment variable overriding the backend base URL.
pub const BASE_URL_ENV: &str = "DOCUFLOW_BASE_URL";

/// Per-request HTTP timeout in seconds. Uploads of large files go through
/// the same client, so this is generous.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Retrieval depth for Q&A requests.
pub const DEFAULT_ASK_TOP_K: u32 = 5;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Everything a `WorkflowController` needs to talk to one backend.
#[derive(Debug, Clone, Serialize)]
pub struct ClientConfig {
    /// Backend base URL, no trailing slash.
    pub base_url: String,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// Retrieval depth (`k`) sent with ask requests.
    pub ask_top_k: u32,
    /// Conversion-progress poll: fixed cadence, conversion is fast.
    pub conversion_poll: PollPolicy,
    /// Suggestions poll: enhancement is the slowest stage.
    pub suggestions_poll: PollPolicy,
    /// Observational progress poll that runs alongside the suggestions poll.
    pub progress_poll: PollPolicy,
    /// Auto-pipeline document status poll.
    pub status_poll: PollPolicy,
}

impl ClientConfig {
    /// Config for a given backend, with default poll policies.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            ask_top_k: DEFAULT_ASK_TOP_K,
            conversion_poll: PollPolicy::conversion(),
            suggestions_poll: PollPolicy::suggestions(),
            progress_poll: PollPolicy::progress(),
            status_poll: PollPolicy::status(),
        }
    }

    /// Config from `DOCUFLOW_BASE_URL`, falling back to the local default.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_local_backend() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.ask_top_k, 5);
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let config = ClientConfig::new("http://backend:9000/");
        assert_eq!(config.base_url, "http://backend:9000");
    }

    #[test]
    fn suggestions_policy_has_the_long_cap() {
        let config = ClientConfig::default();
        assert_eq!(config.suggestions_poll.initial_ms, 1200);
        assert_eq!(config.suggestions_poll.max_interval_ms, 15_000);
        assert_eq!(config.suggestions_poll.max_attempts, 60);
    }

    #[test]
    fn config_serializes() {
        let json = serde_json::to_string(&ClientConfig::default()).unwrap();
        assert!(json.contains("\"base_url\""));
        assert!(json.contains("\"suggestions_poll\""));
    }
}
