//! docuflow — client-side workflow controller for an asynchronous document
//! ingestion, curation, and Q&A backend.
//!
//! The backend does the heavy lifting (conversion, OCR, enrichment,
//! retrieval); this crate owns everything a frontend needs around it:
//! uploads, backoff polling of stage progress, the per-document lifecycle
//! state machine, the human curation pass over generated suggestions, and
//! the chat session with its dual-version answer panes.
//!
//! Entry point: [`orchestrator::WorkflowController`], constructed per
//! logical session with a [`api::DocumentApi`] implementation —
//! [`api::HttpApi`] in production, [`api::MockApi`] in tests.

pub mod api;
pub mod chat;
pub mod config;
pub mod curation;
pub mod document;
pub mod orchestrator;
pub mod poll;

pub use api::{ApiError, DocumentApi, HttpApi, MockApi};
pub use chat::{ChatSession, SubmitOutcome};
pub use config::ClientConfig;
pub use curation::CurationStore;
pub use document::{BatchSummary, DocumentRegistry, DocumentStage, TrackedDocument};
pub use orchestrator::{EventSink, NullSink, WorkflowController, WorkflowError, WorkflowEvent};
pub use poll::{PollError, PollPolicy, PollVerdict};
