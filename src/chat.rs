//! Q&A session over a finalized document.
//!
//! Every ask is stateless on the backend; the session only keeps what the
//! user can see: the transcript bubbles and the two answer panes of the
//! version-compare view. A single busy flag guards against concurrent
//! submission — a second ask while one is in flight is dropped, not queued,
//! and every exit path (success, backend error, malformed payload) returns
//! the session to ready.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::client::DocumentApi;
use crate::api::types::{
    AskRequest, AskResponse, AskVersion, RetrievedSource, SourceMetadata, TokenUsage,
};

// ═══════════════════════════════════════════════════════════
// Transcript
// ═══════════════════════════════════════════════════════════

/// One evidence row under an answer bubble.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceView {
    /// 1-based retrieval rank.
    pub rank: usize,
    /// Similarity score as whole percent, 0–100.
    pub relevance_percent: u8,
    pub snippet: String,
    pub metadata: SourceMetadata,
}

impl EvidenceView {
    fn from_source(rank: usize, source: &RetrievedSource) -> Self {
        Self {
            rank,
            relevance_percent: (source.score * 100.0).round().clamp(0.0, 100.0) as u8,
            snippet: source.snippet.clone(),
            metadata: source.metadata.clone(),
        }
    }

    fn from_sources(sources: &[RetrievedSource]) -> Vec<Self> {
        sources
            .iter()
            .enumerate()
            .map(|(i, s)| Self::from_source(i + 1, s))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    User {
        id: Uuid,
        text: String,
        sent_at: DateTime<Utc>,
    },
    Answer {
        id: Uuid,
        text: String,
        evidence: Vec<EvidenceView>,
        token_usage: Option<TokenUsage>,
        received_at: DateTime<Utc>,
    },
    Error {
        id: Uuid,
        message: String,
        received_at: DateTime<Utc>,
    },
}

// ═══════════════════════════════════════════════════════════
// Answer panes
// ═══════════════════════════════════════════════════════════

/// One side of the version-compare view.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnswerPane {
    pub answer: String,
    pub evidence: Vec<EvidenceView>,
    pub token_usage: Option<TokenUsage>,
}

/// The two compare panes. A `both` response fills both; a single-version
/// response fills its own pane and clears the other pane's evidence so the
/// view never shows provenance from a previous question.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnswerPanes {
    pub v1: Option<AnswerPane>,
    pub v2: Option<AnswerPane>,
}

impl AnswerPanes {
    fn apply(&mut self, response: &AskResponse) {
        match response {
            AskResponse::Both(both) => {
                self.v1 = Some(AnswerPane {
                    answer: both.unenriched_answer.clone(),
                    evidence: EvidenceView::from_sources(&both.unenriched_sources),
                    token_usage: both.unenriched_token_usage.clone(),
                });
                self.v2 = Some(AnswerPane {
                    answer: both.enriched_answer.clone(),
                    evidence: EvidenceView::from_sources(&both.enriched_sources),
                    token_usage: both.enriched_token_usage.clone(),
                });
            }
            AskResponse::Single(single) => {
                let pane = AnswerPane {
                    answer: single.answer.clone(),
                    evidence: EvidenceView::from_sources(&single.sources),
                    token_usage: single.token_usage.clone(),
                };
                // the backend echoes which version it answered
                match single.version {
                    AskVersion::V2 => {
                        self.v2 = Some(pane);
                        if let Some(other) = &mut self.v1 {
                            other.evidence.clear();
                        }
                    }
                    _ => {
                        self.v1 = Some(pane);
                        if let Some(other) = &mut self.v2 {
                            other.evidence.clear();
                        }
                    }
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════

/// Outcome of one submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Dropped: session busy or prompt empty. Nothing changed.
    Ignored,
    /// Answer appended and panes updated.
    Answered,
    /// Error bubble appended; session is ready again.
    Failed,
}

#[derive(Debug, Default)]
pub struct ChatSession {
    transcript: Vec<ChatMessage>,
    panes: AnswerPanes,
    busy: bool,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn panes(&self) -> &AnswerPanes {
        &self.panes
    }

    /// Submit a question. The busy flag is held only for the duration of
    /// this call and is released on every path out of it.
    pub async fn ask(&mut self, api: &dyn DocumentApi, request: AskRequest) -> SubmitOutcome {
        if self.busy {
            tracing::debug!("ask dropped: session busy");
            return SubmitOutcome::Ignored;
        }
        if request.prompt.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }

        self.busy = true;
        self.transcript.push(ChatMessage::User {
            id: Uuid::new_v4(),
            text: request.prompt.clone(),
            sent_at: Utc::now(),
        });

        let result = api.ask(&request).await;
        self.busy = false;

        match result {
            Ok(response) => {
                self.panes.apply(&response);
                let (text, evidence, token_usage) = match &response {
                    AskResponse::Single(single) => (
                        single.answer.clone(),
                        EvidenceView::from_sources(&single.sources),
                        single.token_usage.clone(),
                    ),
                    // the enriched answer is the headline in compare mode
                    AskResponse::Both(both) => (
                        both.enriched_answer.clone(),
                        EvidenceView::from_sources(&both.enriched_sources),
                        both.enriched_token_usage.clone(),
                    ),
                };
                self.transcript.push(ChatMessage::Answer {
                    id: Uuid::new_v4(),
                    text,
                    evidence,
                    token_usage,
                    received_at: Utc::now(),
                });
                SubmitOutcome::Answered
            }
            Err(e) => {
                tracing::warn!(error = %e, "ask failed");
                self.transcript.push(ChatMessage::Error {
                    id: Uuid::new_v4(),
                    message: e.to_string(),
                    received_at: Utc::now(),
                });
                SubmitOutcome::Failed
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::ApiError;
    use crate::api::types::{AskBothResponse, AskSingleResponse};
    use crate::api::MockApi;

    fn request(prompt: &str, version: AskVersion) -> AskRequest {
        AskRequest {
            document_id: "doc-1".into(),
            prompt: prompt.into(),
            version,
            trace: false,
            k: 5,
        }
    }

    fn source(id: &str, score: f64) -> RetrievedSource {
        RetrievedSource {
            id: id.into(),
            score,
            snippet: format!("snippet {id}"),
            metadata: SourceMetadata::default(),
        }
    }

    fn both_response() -> AskResponse {
        AskResponse::Both(AskBothResponse {
            unenriched_answer: "plain answer".into(),
            enriched_answer: "enriched answer".into(),
            unenriched_sources: vec![source("u-1", 0.91)],
            enriched_sources: vec![source("e-1", 0.95), source("e-2", 0.62)],
            unenriched_token_usage: None,
            enriched_token_usage: None,
        })
    }

    fn single_response(version: AskVersion, answer: &str) -> AskResponse {
        AskResponse::Single(AskSingleResponse {
            answer: answer.into(),
            version,
            sources: vec![source("s-1", 0.873)],
            token_usage: None,
        })
    }

    #[tokio::test]
    async fn both_populates_two_independent_panes() {
        let mock = MockApi::new();
        mock.script_ask(Ok(both_response()));
        let mut session = ChatSession::new();

        let outcome = session.ask(&mock, request("what is this?", AskVersion::Both)).await;
        assert_eq!(outcome, SubmitOutcome::Answered);

        let panes = session.panes();
        assert_eq!(panes.v1.as_ref().unwrap().answer, "plain answer");
        assert_eq!(panes.v2.as_ref().unwrap().answer, "enriched answer");
        assert_eq!(panes.v1.as_ref().unwrap().evidence.len(), 1);
        assert_eq!(panes.v2.as_ref().unwrap().evidence.len(), 2);
    }

    #[tokio::test]
    async fn v1_fills_its_pane_and_clears_v2_evidence() {
        let mock = MockApi::new();
        mock.script_ask(Ok(both_response()));
        mock.script_ask(Ok(single_response(AskVersion::V1, "v1 only")));
        let mut session = ChatSession::new();

        session.ask(&mock, request("first", AskVersion::Both)).await;
        session.ask(&mock, request("second", AskVersion::V1)).await;

        let panes = session.panes();
        assert_eq!(panes.v1.as_ref().unwrap().answer, "v1 only");
        // stale provenance from the previous question is gone
        assert!(panes.v2.as_ref().unwrap().evidence.is_empty());
        // but the old v2 answer text is still displayed
        assert_eq!(panes.v2.as_ref().unwrap().answer, "enriched answer");
    }

    #[tokio::test]
    async fn v2_clears_v1_evidence_symmetrically() {
        let mock = MockApi::new();
        mock.script_ask(Ok(both_response()));
        mock.script_ask(Ok(single_response(AskVersion::V2, "v2 only")));
        let mut session = ChatSession::new();

        session.ask(&mock, request("first", AskVersion::Both)).await;
        session.ask(&mock, request("second", AskVersion::V2)).await;

        let panes = session.panes();
        assert_eq!(panes.v2.as_ref().unwrap().answer, "v2 only");
        assert!(panes.v1.as_ref().unwrap().evidence.is_empty());
    }

    #[tokio::test]
    async fn busy_session_drops_the_submission() {
        let mock = MockApi::new();
        let mut session = ChatSession::new();
        session.busy = true;

        let outcome = session.ask(&mock, request("anyone there?", AskVersion::Both)).await;
        assert_eq!(outcome, SubmitOutcome::Ignored);
        assert!(session.transcript().is_empty());
        assert!(session.is_busy());
    }

    #[tokio::test]
    async fn empty_prompt_is_a_noop() {
        let mock = MockApi::new();
        let mut session = ChatSession::new();
        let outcome = session.ask(&mock, request("   ", AskVersion::Both)).await;
        assert_eq!(outcome, SubmitOutcome::Ignored);
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn failure_appends_error_bubble_and_reenables_session() {
        let mock = MockApi::new();
        mock.script_ask(Err(ApiError::Backend {
            status: 404,
            detail: "Document not found".into(),
        }));
        let mut session = ChatSession::new();

        let outcome = session.ask(&mock, request("lost?", AskVersion::V1)).await;
        assert_eq!(outcome, SubmitOutcome::Failed);
        assert!(!session.is_busy());

        match session.transcript().last().unwrap() {
            ChatMessage::Error { message, .. } => assert_eq!(message, "Document not found"),
            other => panic!("expected error bubble, got {other:?}"),
        }

        // the session is usable again
        mock.script_ask(Ok(single_response(AskVersion::V1, "found it")));
        let outcome = session.ask(&mock, request("retry", AskVersion::V1)).await;
        assert_eq!(outcome, SubmitOutcome::Answered);
    }

    #[tokio::test]
    async fn evidence_carries_rank_and_percent_score() {
        let mock = MockApi::new();
        mock.script_ask(Ok(single_response(AskVersion::V1, "scored")));
        let mut session = ChatSession::new();
        session.ask(&mock, request("score?", AskVersion::V1)).await;

        let evidence = &session.panes().v1.as_ref().unwrap().evidence;
        assert_eq!(evidence[0].rank, 1);
        assert_eq!(evidence[0].relevance_percent, 87);
    }

    #[tokio::test]
    async fn transcript_records_user_then_answer() {
        let mock = MockApi::new();
        mock.script_ask(Ok(both_response()));
        let mut session = ChatSession::new();
        session.ask(&mock, request("compare", AskVersion::Both)).await;

        assert_eq!(session.transcript().len(), 2);
        assert!(matches!(session.transcript()[0], ChatMessage::User { .. }));
        match &session.transcript()[1] {
            ChatMessage::Answer { text, evidence, .. } => {
                assert_eq!(text, "enriched answer");
                assert_eq!(evidence.len(), 2);
            }
            other => panic!("expected answer bubble, got {other:?}"),
        }
    }
}
