//! exam-watch · reconciled exam countdown from the command line
//!
//! Asks the backend how long the exam has left, then counts down locally, re-checking
//! the server periodically and logging every phase change until time is up.
//!
//! Important env variables:
//!   EXAM_ID            : exam to watch (required)
//!   EXAM_CLIENT_CONFIG : path to TOML config (endpoints, thresholds)
//!   EXAM_BASE_URL      : backend base URL override
//!   EXAM_CSRF_TOKEN    : anti-forgery token override
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{error, info, instrument};

use exam_autosave::countdown::format_hms;
use exam_autosave::protocol::ExamStatus;
use exam_autosave::{load_client_config_from_env, telemetry, ClockEvent, CountdownClock, CountdownTimer, ExamTimeProbe, SaveClient};

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let exam_id: u64 = match std::env::var("EXAM_ID").ok().and_then(|s| s.parse().ok()) {
    Some(id) => id,
    None => {
      error!(target: "exam_watch", "EXAM_ID must be set to a numeric exam id");
      return Err("EXAM_ID missing or invalid".into());
    }
  };

  let cfg = load_client_config_from_env().map_err(|e| {
    error!(target: "exam_watch", error = %e, "Configuration error");
    e
  })?;
  let client = SaveClient::new(&cfg.endpoints)?;

  let server = client.check_time(exam_id).await?;
  info!(target: "exam_watch", exam_id, remaining = server.remaining_seconds, status = ?server.status, "Server time");
  if server.status == ExamStatus::NotStarted {
    info!(target: "exam_watch", exam_id, starts_in = server.remaining_seconds, "Exam has not started yet");
    return Ok(());
  }
  let remaining = if server.status == ExamStatus::Ended { 0 } else { server.remaining() };

  let (done_tx, done_rx) = oneshot::channel();
  let clock = CountdownClock::new(remaining, &cfg.countdown, Instant::now());
  let mut timer = CountdownTimer::new(clock, move || {
    let _ = done_tx.send(());
  });
  let mut events = timer.subscribe();

  match cfg.countdown.reconcile_interval_secs {
    Some(secs) => timer.start_with_reconciliation(ExamTimeProbe { client, exam_id }, Duration::from_secs(secs)),
    None => timer.start(),
  }

  let display = tokio::spawn(async move {
    loop {
      match events.recv().await {
        Ok(ClockEvent::Tick { remaining }) if remaining % 60 == 0 => {
          info!(target: "exam_watch", left = %format_hms(remaining), "Time left");
        }
        Ok(_) | Err(RecvError::Lagged(_)) => {}
        Err(RecvError::Closed) => break,
      }
    }
  });

  tokio::select! {
    _ = done_rx => info!(target: "exam_watch", exam_id, "Exam time is over"),
    _ = tokio::signal::ctrl_c() => info!(target: "exam_watch", left = %timer.display(), "Interrupted"),
  }
  timer.stop();
  display.abort();
  Ok(())
}
