//! HTTP client for the exam backend.
//!
//! Every call turns into exactly one request and normalizes the outcome: non-2xx status,
//! undecodable bodies, `success: false`, and network failures all come back as
//! `ClientError`. Nothing here panics on a bad response.
//!
//! NOTE: the anti-forgery token is sent as a header and never logged.

use std::time::Duration;

use chrono::NaiveDateTime;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::Endpoints;
use crate::domain::AnswerPayload;
use crate::draft::DraftSnapshot;
use crate::error::{ClientError, ConfigError};
use crate::protocol::{AckResponse, ErrorBody, Question, QuestionReply, ReorderIn, SaveResponse, ScoreUpdateIn, ServerTime};
use crate::pump::{SaveBackend, SaveReceipt};
use crate::timer::ServerTimeSource;
use crate::util::{fill_template, trunc_for_log};

/// Timestamp format used by the backend's `saved_at`.
const SAVED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct SaveClient {
  client: reqwest::Client,
  base_url: Url,
  endpoints: Endpoints,
}

impl std::fmt::Debug for SaveClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SaveClient")
      .field("base_url", &self.base_url.as_str())
      .field("csrf_token", &self.endpoints.csrf_token.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}

impl SaveClient {
  /// Build the client. A malformed base URL is a configuration error, not a save failure.
  pub fn new(endpoints: &Endpoints) -> Result<Self, ConfigError> {
    let mut base_url = Url::parse(&endpoints.base_url)
      .map_err(|e| ConfigError::Endpoint(format!("{}: {e}", endpoints.base_url)))?;
    if base_url.cannot_be_a_base() {
      return Err(ConfigError::Endpoint(format!("{} cannot be used as a base URL", endpoints.base_url)));
    }
    // the app may be mounted under a prefix; endpoint paths resolve below it
    if !base_url.path().ends_with('/') {
      let prefixed = format!("{}/", base_url.path());
      base_url.set_path(&prefixed);
    }
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(endpoints.timeout_secs.max(1)))
      .build()
      .map_err(|e| ConfigError::Endpoint(e.to_string()))?;
    Ok(Self { client, base_url, endpoints: endpoints.clone() })
  }

  /// Replace the anti-forgery token (the host page may rotate it).
  pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
    self.endpoints.csrf_token = Some(token.into());
    self
  }

  fn url(&self, path: &str) -> Result<Url, ClientError> {
    self.base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| ClientError::Transport(format!("bad request path {path}: {e}")))
  }

  async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ClientError>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let url = self.url(path)?;
    let mut req = self.client.request(method, url).header(USER_AGENT, "exam-autosave/0.1");
    if let Some(token) = &self.endpoints.csrf_token {
      req = req.header(self.endpoints.csrf_header.as_str(), token.as_str());
    }
    req = match body {
      Some(b) => req.json(b),
      None => req.header(CONTENT_TYPE, "application/json"),
    };

    let start = std::time::Instant::now();
    let res = req.send().await.map_err(|e| ClientError::Transport(e.to_string()))?;
    let status = res.status();
    let text = res.text().await.map_err(|e| ClientError::Transport(e.to_string()))?;
    debug!(target: "exam_client", %path, status = status.as_u16(), elapsed = ?start.elapsed(), body_len = text.len(), "Response received");

    if !status.is_success() {
      let message = extract_error_message(&text).unwrap_or_else(|| trunc_for_log(&text, 200));
      return Err(ClientError::Http { status: status.as_u16(), message });
    }
    serde_json::from_str::<T>(&text).map_err(|e| {
      warn!(target: "exam_client", %path, body = %trunc_for_log(&text, 200), "Unexpected response body");
      ClientError::Decode(e.to_string())
    })
  }

  async fn post_save<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<SaveReceipt, ClientError> {
    let reply: SaveResponse = self.request(Method::POST, path, Some(body)).await?;
    receipt_from(reply)
  }

  async fn post_ack<B: Serialize + ?Sized>(&self, path: &str, body: Option<&B>) -> Result<(), ClientError> {
    let reply: AckResponse = self.request(Method::POST, path, body).await?;
    if reply.success {
      Ok(())
    } else {
      Err(ClientError::Rejected(reply.message.unwrap_or_else(|| "unknown error".into())))
    }
  }

  #[instrument(level = "info", skip(self, payload), fields(score_id = payload.score_id, question_id = payload.question_id, answer_len = payload.answer_content.len()))]
  pub async fn save_answer(&self, payload: &AnswerPayload) -> Result<SaveReceipt, ClientError> {
    self.post_save(&self.endpoints.save_answer, payload).await
  }

  #[instrument(level = "info", skip(self, draft), fields(fields = draft.len()))]
  pub async fn save_draft(&self, draft: &DraftSnapshot) -> Result<SaveReceipt, ClientError> {
    self.post_save(&self.endpoints.save_draft, draft).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn fetch_question(&self, exam_id: u64, question_id: u64) -> Result<Question, ClientError> {
    let path = self.path(&self.endpoints.question, exam_id, Some(question_id));
    match self.request::<(), QuestionReply>(Method::GET, &path, None).await? {
      QuestionReply::Question(q) => Ok(q),
      QuestionReply::Failure { error, message } => Err(ClientError::Rejected(message.unwrap_or(error))),
    }
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn check_time(&self, exam_id: u64) -> Result<ServerTime, ClientError> {
    let path = self.path(&self.endpoints.check_time, exam_id, None);
    self.request::<(), ServerTime>(Method::GET, &path, None).await
  }

  /// Persist a new question order; `question_ids` is the order top to bottom.
  #[instrument(level = "info", skip(self, question_ids), fields(count = question_ids.len()))]
  pub async fn reorder_questions(&self, exam_id: u64, question_ids: &[u64]) -> Result<(), ClientError> {
    let path = self.path(&self.endpoints.reorder_questions, exam_id, None);
    self.post_ack(&path, Some(&ReorderIn::from_order(question_ids))).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn update_question_score(&self, exam_id: u64, question_id: u64, score: f64) -> Result<(), ClientError> {
    let path = self.path(&self.endpoints.update_question_score, exam_id, Some(question_id));
    self.post_ack(&path, Some(&ScoreUpdateIn { score })).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn add_question(&self, exam_id: u64, question_id: u64) -> Result<(), ClientError> {
    let path = self.path(&self.endpoints.add_question, exam_id, Some(question_id));
    self.post_ack::<()>(&path, None).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn remove_question(&self, exam_id: u64, question_id: u64) -> Result<(), ClientError> {
    let path = self.path(&self.endpoints.remove_question, exam_id, Some(question_id));
    self.post_ack::<()>(&path, None).await
  }

  fn path(&self, tpl: &str, exam_id: u64, question_id: Option<u64>) -> String {
    let exam = exam_id.to_string();
    let question = question_id.map(|q| q.to_string()).unwrap_or_default();
    fill_template(tpl, &[("exam_id", &exam), ("question_id", &question)])
  }
}

impl SaveBackend<AnswerPayload> for SaveClient {
  async fn save(&self, payload: AnswerPayload) -> Result<SaveReceipt, ClientError> {
    self.save_answer(&payload).await
  }
}

impl SaveBackend<DraftSnapshot> for SaveClient {
  async fn save(&self, payload: DraftSnapshot) -> Result<SaveReceipt, ClientError> {
    self.save_draft(&payload).await
  }
}

/// Server-time source for one exam, used to reconcile the countdown.
#[derive(Clone, Debug)]
pub struct ExamTimeProbe {
  pub client: SaveClient,
  pub exam_id: u64,
}

impl ServerTimeSource for ExamTimeProbe {
  async fn server_time(&self) -> Result<ServerTime, ClientError> {
    self.client.check_time(self.exam_id).await
  }
}

/// Turn a save reply into a receipt. A missing or odd `saved_at` falls back to the current UTC time,
/// the same zone the backend stamps saves in.
fn receipt_from(reply: SaveResponse) -> Result<SaveReceipt, ClientError> {
  if !reply.success {
    return Err(ClientError::Rejected(reply.message.unwrap_or_else(|| "unknown error".into())));
  }
  let saved_at = reply
    .saved_at
    .as_deref()
    .and_then(|s| NaiveDateTime::parse_from_str(s.trim(), SAVED_AT_FORMAT).ok())
    .unwrap_or_else(|| chrono::Utc::now().naive_utc());
  Ok(SaveReceipt { saved_at, message: reply.message })
}

/// Pull a human-readable reason out of a JSON error body, if there is one.
fn extract_error_message(body: &str) -> Option<String> {
  serde_json::from_str::<ErrorBody>(body).ok().and_then(ErrorBody::reason)
}
