//! Wire structs for the exam backend endpoints (serde ready).
//! Field names follow the backend's JSON exactly; keep this small and stable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::QuestionType;

/// Reply of the answer-save and draft-save endpoints.
#[derive(Debug, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(default)]
    pub saved_at: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Generic `{success, message}` reply (reorder, score update, add/remove question).
#[derive(Debug, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body shape used by several endpoints: `{error, message}`.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Prefer the human-readable message, fall back to the short error tag.
    pub fn reason(self) -> Option<String> {
        self.message
            .filter(|m| !m.trim().is_empty())
            .or(self.error.filter(|e| !e.trim().is_empty()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamStatus {
    InProgress,
    Ended,
    NotStarted,
}

/// Reply of the server-time endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerTime {
    pub remaining_seconds: i64,
    pub status: ExamStatus,
    #[serde(default)]
    pub current_time: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl ServerTime {
    pub fn remaining(&self) -> u64 {
        self.remaining_seconds.max(0) as u64
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct QuestionOption {
    pub id: u64,
    pub content: String,
}

/// Reply of the question-fetch endpoint.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Question {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub answer_template: Option<String>,
    #[serde(default)]
    pub saved_answer: Option<String>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

/// The question endpoint answers 200 with `{error, message}` on some failures.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum QuestionReply {
    Failure {
        error: String,
        #[serde(default)]
        message: Option<String>,
    },
    Question(Question),
}

/// Body of the reorder endpoint: `{"<question_id>": <1-based position>}`.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ReorderIn(pub BTreeMap<String, u32>);

impl ReorderIn {
    pub fn from_order(question_ids: &[u64]) -> Self {
        Self(
            question_ids
                .iter()
                .enumerate()
                .map(|(i, id)| (id.to_string(), (i + 1) as u32))
                .collect(),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ScoreUpdateIn {
    pub score: f64,
}
