//! exam-autosave · client-side save and timing logic for an online exam application
//!
//! - `AutosaveSession`: dirty tracking, debounced + periodic saves, one request in flight
//! - `SaveClient`: the backend endpoints (answer/draft save, question fetch, server time,
//!   question management), with every failure normalized into `ClientError`
//! - `CountdownClock` / `CountdownTimer`: wall-clock countdown with server reconciliation
//!
//! Presentation is left to the host: sessions and timers publish events over
//! `tokio::sync::broadcast` channels for a view layer to render.

pub mod client;
pub mod config;
pub mod countdown;
pub mod dirty;
pub mod domain;
pub mod draft;
pub mod error;
pub mod protocol;
pub mod pump;
pub mod sheet;
pub mod state;
pub mod telemetry;
pub mod timer;
pub mod util;

pub use client::{ExamTimeProbe, SaveClient};
pub use config::{load_client_config_from_env, AutosaveConfig, ClientConfig, CountdownConfig, Endpoints};
pub use countdown::{ClockEvent, CountdownClock, Phase};
pub use dirty::{DirtyStatus, DirtyTracker};
pub use domain::{AnswerContent, AnswerPayload, QuestionType};
pub use draft::DraftSnapshot;
pub use error::{AnswerError, ClientError, ClockError, CollectError, ConfigError};
pub use pump::{AutosaveSession, PayloadSource, SaveBackend, SaveEvent, SaveReceipt};
pub use sheet::AnswerSheet;
pub use state::{SaveState, Trigger};
pub use timer::{CountdownTimer, ServerTimeSource};
