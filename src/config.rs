//! Loading client configuration (endpoints, autosave cadence, countdown thresholds) from TOML.
//!
//! Every section and field is optional; defaults match the exam application's own routes
//! and timings. See `ClientConfig` for the schema.
//!
//! Env variables:
//!   EXAM_CLIENT_CONFIG : path to the TOML file (defaults are used when unset)
//!   EXAM_BASE_URL      : overrides `endpoints.base_url`
//!   EXAM_CSRF_TOKEN    : overrides `endpoints.csrf_token`

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
  pub endpoints: Endpoints,
  pub autosave: AutosaveConfig,
  pub countdown: CountdownConfig,
}

/// Backend location plus path templates for every collaborator endpoint.
/// Templates may use `{exam_id}` and `{question_id}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Endpoints {
  /// Origin plus an optional mount prefix, e.g. `https://host/exam-app`.
  pub base_url: String,
  pub csrf_header: String,
  pub csrf_token: Option<String>,
  pub timeout_secs: u64,

  pub save_answer: String,
  pub save_draft: String,
  pub question: String,
  pub check_time: String,
  pub reorder_questions: String,
  pub update_question_score: String,
  pub add_question: String,
  pub remove_question: String,
}

impl Default for Endpoints {
  fn default() -> Self {
    Self {
      base_url: "http://127.0.0.1:5000".into(),
      csrf_header: "X-CSRFToken".into(),
      csrf_token: None,
      timeout_secs: 20,
      save_answer: "/exams/student/save_answer".into(),
      save_draft: "/exams/save_draft".into(),
      question: "/exams/student/get_question/{exam_id}/{question_id}".into(),
      check_time: "/exams/student/check_time/{exam_id}".into(),
      reorder_questions: "/exams/{exam_id}/reorder_questions".into(),
      update_question_score: "/exams/{exam_id}/update_question_score/{question_id}".into(),
      add_question: "/exams/{exam_id}/add_question/{question_id}".into(),
      remove_question: "/exams/{exam_id}/remove_question/{question_id}".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
  /// Periodic flush interval.
  pub interval_secs: u64,
  /// Quiet window after the last keystroke before a debounced save.
  pub debounce_ms: u64,
}

impl Default for AutosaveConfig {
  fn default() -> Self {
    Self { interval_secs: 30, debounce_ms: 2000 }
  }
}

impl AutosaveConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs)
  }

  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CountdownConfig {
  pub warning_threshold_secs: u64,
  pub danger_threshold_secs: u64,
  /// Local/server disagreement (seconds) tolerated before snapping to the server value.
  pub reconcile_threshold_secs: u64,
  /// How often to ask the server for the remaining time. `None` disables reconciliation.
  pub reconcile_interval_secs: Option<u64>,
}

impl Default for CountdownConfig {
  fn default() -> Self {
    Self {
      warning_threshold_secs: 300,
      danger_threshold_secs: 60,
      reconcile_threshold_secs: 10,
      reconcile_interval_secs: Some(60),
    }
  }
}

impl ClientConfig {
  /// Reject values that would make the timers spin or the phases overlap.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.autosave.interval_secs == 0 {
      return Err(ConfigError::Invalid("autosave.interval_secs must be > 0".into()));
    }
    if self.autosave.debounce_ms == 0 {
      return Err(ConfigError::Invalid("autosave.debounce_ms must be > 0".into()));
    }
    if self.countdown.danger_threshold_secs > self.countdown.warning_threshold_secs {
      return Err(ConfigError::Invalid(
        "countdown.danger_threshold_secs must not exceed warning_threshold_secs".into(),
      ));
    }
    if self.countdown.reconcile_interval_secs == Some(0) {
      return Err(ConfigError::Invalid("countdown.reconcile_interval_secs must be > 0".into()));
    }
    if self.endpoints.base_url.trim().is_empty() {
      return Err(ConfigError::Endpoint("endpoints.base_url is empty".into()));
    }
    Ok(())
  }

  pub fn from_toml_str(s: &str, path: PathBuf) -> Result<Self, ConfigError> {
    let cfg: ClientConfig = toml::from_str(s).map_err(|source| ConfigError::Parse { path, source })?;
    cfg.validate()?;
    Ok(cfg)
  }
}

/// Load `ClientConfig` from EXAM_CLIENT_CONFIG (or defaults), then apply env overrides.
pub fn load_client_config_from_env() -> Result<ClientConfig, ConfigError> {
  let mut cfg = match std::env::var("EXAM_CLIENT_CONFIG") {
    Ok(path) => {
      let path = PathBuf::from(path);
      let s = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path: path.clone(), source })?;
      let cfg = ClientConfig::from_toml_str(&s, path.clone())?;
      info!(target: "exam_client", path = %path.display(), "Loaded client config (TOML)");
      cfg
    }
    Err(_) => {
      info!(target: "exam_client", "EXAM_CLIENT_CONFIG not set; using default client config");
      ClientConfig::default()
    }
  };

  if let Ok(url) = std::env::var("EXAM_BASE_URL") {
    cfg.endpoints.base_url = url;
  }
  if let Ok(token) = std::env::var("EXAM_CSRF_TOKEN") {
    cfg.endpoints.csrf_token = Some(token);
  }
  cfg.validate()?;
  Ok(cfg)
}
