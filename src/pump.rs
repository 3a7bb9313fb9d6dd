//! Autosave pump: decides *when* to save and guarantees attempts never overlap.
//!
//! One `AutosaveSession` per editable surface. The host marks changes synchronously
//! (`mark_dirty`, `input`); a tokio task owns the periodic and debounce timers and polls
//! the single in-flight save. Attempts are coalesced, not queued: anything that fires
//! while a save is outstanding is a no-op, and edits made meanwhile keep the session
//! dirty so the next trigger picks them up.
//!
//! Failures are never retried immediately. The next periodic tick (or the next debounced
//! input) is the retry.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::AutosaveConfig;
use crate::dirty::{DirtyStatus, DirtyTracker};
use crate::error::{ClientError, CollectError};
use crate::state::{SaveState, SessionState, SharedState, Trigger};
use crate::util::lock;

/// Server confirmation of a save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveReceipt {
  pub saved_at: NaiveDateTime,
  pub message: Option<String>,
}

/// Produces the payload for an attempt. `Ok(None)` means there is nothing to send.
pub trait PayloadSource<P>: Send + 'static {
  fn collect(&mut self) -> Result<Option<P>, CollectError>;
}

impl<P, F> PayloadSource<P> for F
where
  F: FnMut() -> Result<Option<P>, CollectError> + Send + 'static,
{
  fn collect(&mut self) -> Result<Option<P>, CollectError> {
    self()
  }
}

/// Performs one save request.
pub trait SaveBackend<P>: Send + Sync + 'static {
  fn save(&self, payload: P) -> impl Future<Output = Result<SaveReceipt, ClientError>> + Send;
}

/// Status changes a view layer can subscribe to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveEvent {
  /// First edit after a save; hide any "saved" indicator.
  Unsaved,
  Saving { trigger: Trigger },
  /// `settled` is false when edits arrived while the request was in flight.
  Saved { saved_at: NaiveDateTime, settled: bool },
  SaveFailed { reason: String },
  /// The payload could not be collected; nothing was sent.
  Skipped { reason: String },
}

#[derive(Debug)]
enum Command {
  Input,
  Restart,
  Stop,
  SaveNow,
  Shutdown,
}

type SaveFuture = Pin<Box<dyn Future<Output = Result<SaveReceipt, ClientError>> + Send>>;

struct InFlight {
  revision: u64,
  trigger: Trigger,
  future: SaveFuture,
}

struct AutosavePump<P, C, S> {
  interval: Duration,
  debounce: Duration,
  state: SharedState,
  source: C,
  saver: Arc<S>,
  events: broadcast::Sender<SaveEvent>,
  periodic: Option<Interval>,
  debounce_timer: Option<Pin<Box<Sleep>>>,
  _payload: PhantomData<fn() -> P>,
}

impl<P, C, S> AutosavePump<P, C, S>
where
  P: Send + 'static,
  C: PayloadSource<P>,
  S: SaveBackend<P>,
{
  async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
    self.arm_periodic();
    let mut in_flight: Option<InFlight> = None;

    loop {
      tokio::select! {
        biased;

        cmd = commands.recv() => match cmd {
          Some(Command::Input) => self.arm_debounce(),
          Some(Command::Restart) => self.arm_periodic(),
          Some(Command::Stop) => {
            self.periodic = None;
            self.debounce_timer = None;
            info!(target: "autosave", "Autosave stopped");
          }
          Some(Command::SaveNow) => {
            if let Some(next) = self.attempt(Trigger::Manual) {
              in_flight = Some(next);
            }
          }
          Some(Command::Shutdown) | None => break,
        },

        result = poll_in_flight(&mut in_flight) => {
          if let Some(done) = in_flight.take() {
            self.complete(done.revision, done.trigger, result);
          }
        }

        _ = debounce_elapsed(&mut self.debounce_timer) => {
          self.debounce_timer = None;
          if let Some(next) = self.attempt(Trigger::Debounce) {
            in_flight = Some(next);
          }
        }

        _ = next_tick(&mut self.periodic) => {
          if let Some(next) = self.attempt(Trigger::Periodic) {
            in_flight = Some(next);
          }
        }
      }
    }

    // timers are gone; a save already sent runs to completion
    self.periodic = None;
    self.debounce_timer = None;
    if let Some(InFlight { revision, trigger, future }) = in_flight.take() {
      debug!(target: "autosave", trigger = trigger.as_str(), "Waiting for in-flight save before exiting");
      let result = future.await;
      self.complete(revision, trigger, result);
    }
    debug!(target: "autosave", "Autosave task finished");
  }

  /// Clear any running periodic timer, then arm a fresh one.
  fn arm_periodic(&mut self) {
    let mut iv = interval_at(Instant::now() + self.interval, self.interval);
    iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
    self.periodic = Some(iv);
    debug!(target: "autosave", interval_ms = self.interval.as_millis() as u64, "Periodic timer armed");
  }

  fn arm_debounce(&mut self) {
    if !lock(&self.state).enabled {
      return;
    }
    let deadline = Instant::now() + self.debounce;
    match self.debounce_timer.as_mut() {
      Some(timer) => timer.as_mut().reset(deadline),
      None => self.debounce_timer = Some(Box::pin(sleep_until(deadline))),
    }
  }

  fn attempt(&mut self, trigger: Trigger) -> Option<InFlight> {
    let revision = {
      let mut st = lock(&self.state);
      match st.try_begin(trigger) {
        Some(rev) => rev,
        None => {
          debug!(target: "autosave", trigger = trigger.as_str(), dirty = st.tracker.is_dirty(), saving = st.saving, "Attempt skipped");
          return None;
        }
      }
    };

    let payload = match self.source.collect() {
      Ok(Some(p)) => p,
      Ok(None) => {
        self.abandon(trigger, "nothing to save".into());
        return None;
      }
      Err(e) => {
        self.abandon(trigger, e.to_string());
        return None;
      }
    };

    info!(target: "autosave", trigger = trigger.as_str(), revision, "Saving");
    let _ = self.events.send(SaveEvent::Saving { trigger });
    let saver = Arc::clone(&self.saver);
    Some(InFlight {
      revision,
      trigger,
      future: Box::pin(async move { saver.save(payload).await }),
    })
  }

  /// Collection failed: release the slot, keep dirty as it was.
  fn abandon(&self, trigger: Trigger, reason: String) {
    lock(&self.state).finish();
    warn!(target: "autosave", trigger = trigger.as_str(), %reason, "Payload collection failed; attempt abandoned");
    let _ = self.events.send(SaveEvent::Skipped { reason });
  }

  fn complete(&self, revision: u64, trigger: Trigger, result: Result<SaveReceipt, ClientError>) {
    match result {
      Ok(receipt) => {
        let settled = {
          let mut st = lock(&self.state);
          st.finish();
          st.tracker.settle(revision, receipt.saved_at)
        };
        info!(target: "autosave", trigger = trigger.as_str(), saved_at = %receipt.saved_at, settled, "Saved");
        let _ = self.events.send(SaveEvent::Saved { saved_at: receipt.saved_at, settled });
      }
      Err(e) => {
        lock(&self.state).finish();
        warn!(target: "autosave", trigger = trigger.as_str(), error = %e, "Save failed; will retry on next trigger");
        let _ = self.events.send(SaveEvent::SaveFailed { reason: e.to_string() });
      }
    }
  }
}

async fn poll_in_flight(slot: &mut Option<InFlight>) -> Result<SaveReceipt, ClientError> {
  match slot {
    Some(f) => (&mut f.future).await,
    None => std::future::pending().await,
  }
}

async fn debounce_elapsed(timer: &mut Option<Pin<Box<Sleep>>>) {
  match timer {
    Some(t) => t.as_mut().await,
    None => std::future::pending().await,
  }
}

async fn next_tick(periodic: &mut Option<Interval>) {
  match periodic {
    Some(iv) => {
      iv.tick().await;
    }
    None => std::future::pending().await,
  }
}

/// Host-facing handle for one editable surface.
///
/// Dropping the handle ends the pump task; `shutdown()` does the same and waits for it.
pub struct AutosaveSession {
  id: Uuid,
  state: SharedState,
  commands: mpsc::UnboundedSender<Command>,
  events: broadcast::Sender<SaveEvent>,
  task: JoinHandle<()>,
}

impl AutosaveSession {
  /// Spawn the pump and arm the periodic timer. Must be called inside a tokio runtime.
  pub fn start<P, C, S>(config: &AutosaveConfig, source: C, saver: S) -> Self
  where
    P: Send + 'static,
    C: PayloadSource<P>,
    S: SaveBackend<P>,
  {
    let id = Uuid::new_v4();
    let (events, _) = broadcast::channel(64);
    let hook_events = events.clone();
    let tracker = DirtyTracker::with_hook(move |status| {
      if let DirtyStatus::Unsaved = status {
        let _ = hook_events.send(SaveEvent::Unsaved);
      }
    });
    let state: SharedState = Arc::new(Mutex::new(SessionState::new(tracker)));
    let (tx, rx) = mpsc::unbounded_channel();

    let pump = AutosavePump {
      interval: config.interval(),
      debounce: config.debounce(),
      state: Arc::clone(&state),
      source,
      saver: Arc::new(saver),
      events: events.clone(),
      periodic: None,
      debounce_timer: None,
      _payload: PhantomData,
    };
    let span = info_span!("autosave_session", session = %id);
    let task = tokio::spawn(pump.run(rx).instrument(span));
    info!(target: "autosave", session = %id, interval_secs = config.interval_secs, debounce_ms = config.debounce_ms, "Autosave started");

    Self { id, state, commands: tx, events, task }
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  /// Record a change that should be saved on the next periodic tick.
  pub fn mark_dirty(&self) {
    lock(&self.state).tracker.mark_dirty();
  }

  /// Record a keystroke-style change: marks dirty and (re)starts the debounce window.
  pub fn input(&self) {
    self.mark_dirty();
    self.send(Command::Input);
  }

  /// Host-side confirmation that the current state is saved.
  pub fn mark_saved(&self) {
    let at = chrono::Utc::now().naive_utc();
    lock(&self.state).tracker.mark_clean(at);
    let _ = self.events.send(SaveEvent::Saved { saved_at: at, settled: true });
  }

  pub fn is_dirty(&self) -> bool {
    lock(&self.state).tracker.is_dirty()
  }

  pub fn state(&self) -> SaveState {
    lock(&self.state).snapshot()
  }

  pub fn last_saved_at(&self) -> Option<NaiveDateTime> {
    lock(&self.state).tracker.last_saved_at()
  }

  /// Clear and re-arm the periodic timer, re-enabling autosave if it was stopped.
  pub fn restart(&self) {
    lock(&self.state).enabled = true;
    self.send(Command::Restart);
  }

  pub fn resume(&self) {
    self.restart();
  }

  /// Disarm all timers. Changes are still tracked but trigger nothing until `resume()`.
  pub fn stop(&self) {
    lock(&self.state).enabled = false;
    self.send(Command::Stop);
  }

  /// Save now regardless of dirty state, unless a save is already in flight.
  pub fn save_now(&self) {
    self.send(Command::SaveNow);
  }

  /// The exam was handed in: pending changes no longer matter.
  pub fn mark_submitted(&self) {
    let mut st = lock(&self.state);
    st.submitted = true;
    st.tracker.discard();
  }

  /// True if closing the page now should ask the user to confirm.
  pub fn should_confirm_leave(&self) -> bool {
    lock(&self.state).should_confirm_leave()
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SaveEvent> {
    self.events.subscribe()
  }

  /// Navigation away: stop every timer, let a save already in flight finish, and wait
  /// for the task to end.
  pub async fn shutdown(self) {
    self.send(Command::Shutdown);
    if let Err(e) = self.task.await {
      warn!(target: "autosave", session = %self.id, error = %e, "Autosave task ended abnormally");
    }
  }

  fn send(&self, cmd: Command) {
    if self.commands.send(cmd).is_err() {
      debug!(target: "autosave", session = %self.id, "Autosave task already finished; command dropped");
    }
  }
}
