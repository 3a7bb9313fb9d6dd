//! Error types, one enum per concern.
//!
//! - `CollectError`: the payload producer could not assemble a payload (transient).
//! - `ClientError`: a backend call failed (network, HTTP status, body, or server refusal).
//! - `ConfigError`: missing/invalid configuration; reported at construction, never retried.
//! - `AnswerError`: stored answer content could not be decoded.
//! - `ClockError`: an operation that the countdown refuses in its current state.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
  #[error("no question is currently selected")]
  NoQuestionSelected,
  #[error("form state is inconsistent: {0}")]
  Inconsistent(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
  /// The request never produced an HTTP response (connect, timeout, TLS...).
  #[error("network error: {0}")]
  Transport(String),
  /// Non-2xx status. `message` is the server's `message`/`error` field when present.
  #[error("HTTP {status}: {message}")]
  Http { status: u16, message: String },
  /// 2xx status but the body was not the expected JSON shape.
  #[error("malformed response: {0}")]
  Decode(String),
  /// Well-formed response carrying `success: false` (or an `error` field).
  #[error("rejected by server: {0}")]
  Rejected(String),
}

impl ClientError {
  /// True for failures where no server ever saw the request.
  pub fn is_transport(&self) -> bool {
    matches!(self, ClientError::Transport(_))
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
  #[error("invalid endpoint: {0}")]
  Endpoint(String),
  #[error("invalid configuration: {0}")]
  Invalid(String),
}

#[derive(Debug, Error)]
pub enum AnswerError {
  #[error("choice answer is not valid JSON: {0}")]
  Json(#[from] serde_json::Error),
  #[error("choice answer is not an array of option ids")]
  NotAnArray,
  #[error("invalid option id in choice answer: {0}")]
  InvalidOption(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
  #[error("countdown has already expired")]
  Expired,
}
