//! Tokio driver for `CountdownClock`: a 1 s tick task plus optional server reconciliation.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::countdown::{ClockEvent, CountdownClock, Phase};
use crate::error::{ClientError, ClockError};
use crate::protocol::ServerTime;
use crate::util::lock;

const TICK: Duration = Duration::from_secs(1);

/// Authoritative remaining time for one exam.
pub trait ServerTimeSource: Send + Sync + 'static {
  fn server_time(&self) -> impl Future<Output = Result<ServerTime, ClientError>> + Send;
}

type ExpiredHook = Box<dyn FnOnce() + Send>;

struct Shared {
  clock: Mutex<CountdownClock>,
  events: broadcast::Sender<ClockEvent>,
  on_expired: Mutex<Option<ExpiredHook>>,
}

impl Shared {
  /// Publish events; runs the expiry hook (at most once ever). Returns true on expiry.
  fn publish(&self, events: Vec<ClockEvent>) -> bool {
    let mut expired = false;
    for ev in events {
      match &ev {
        ClockEvent::PhaseChanged { from, to } => {
          info!(target: "countdown", from = ?from, to = ?to, "Countdown phase changed")
        }
        ClockEvent::Reconciled { local, server } => {
          info!(target: "countdown", local, server, "Countdown reconciled with server")
        }
        ClockEvent::Expired => expired = true,
        ClockEvent::Tick { .. } => {}
      }
      let _ = self.events.send(ev);
    }
    if expired {
      if let Some(hook) = lock(&self.on_expired).take() {
        info!(target: "countdown", "Time is up");
        hook();
      }
    }
    expired
  }

  fn is_expired(&self) -> bool {
    lock(&self.clock).is_expired()
  }
}

pub struct CountdownTimer {
  shared: Arc<Shared>,
  tasks: Vec<JoinHandle<()>>,
}

impl CountdownTimer {
  pub fn new(clock: CountdownClock, on_expired: impl FnOnce() + Send + 'static) -> Self {
    let (events, _) = broadcast::channel(128);
    Self {
      shared: Arc::new(Shared {
        clock: Mutex::new(clock),
        events,
        on_expired: Mutex::new(Some(Box::new(on_expired))),
      }),
      tasks: Vec::new(),
    }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<ClockEvent> {
    self.shared.events.subscribe()
  }

  pub fn remaining(&self) -> u64 {
    lock(&self.shared.clock).remaining()
  }

  pub fn phase(&self) -> Phase {
    lock(&self.shared.clock).phase()
  }

  pub fn display(&self) -> String {
    lock(&self.shared.clock).display()
  }

  /// Start ticking. Any previous run is stopped first. Must be called inside a runtime.
  pub fn start(&mut self) {
    self.stop();
    if self.shared.is_expired() {
      // constructed (or left) at zero: nothing to count, just make sure the hook ran
      self.shared.publish(vec![ClockEvent::Expired]);
      return;
    }
    let shared = Arc::clone(&self.shared);
    info!(target: "countdown", remaining = self.remaining(), "Countdown started");
    self.tasks.push(tokio::spawn(tick_loop(shared)));
  }

  /// Start ticking and poll `source` every `every` to correct drift.
  pub fn start_with_reconciliation<T: ServerTimeSource>(&mut self, source: T, every: Duration) {
    self.start();
    if self.shared.is_expired() {
      return;
    }
    let shared = Arc::clone(&self.shared);
    self.tasks.push(tokio::spawn(reconcile_loop(shared, source, every)));
  }

  pub fn stop(&mut self) {
    if !self.tasks.is_empty() {
      debug!(target: "countdown", "Countdown stopped");
    }
    for task in self.tasks.drain(..) {
      task.abort();
    }
  }

  /// Host override of the remaining time.
  pub fn set_remaining_seconds(&self, seconds: u64) -> Result<(), ClockError> {
    let events = lock(&self.shared.clock).set_remaining(seconds, Instant::now())?;
    self.shared.publish(events);
    Ok(())
  }
}

impl Drop for CountdownTimer {
  fn drop(&mut self) {
    self.stop();
  }
}

async fn tick_loop(shared: Arc<Shared>) {
  let mut ticker = interval_at(Instant::now() + TICK, TICK);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
  loop {
    ticker.tick().await;
    let events = lock(&shared.clock).tick(Instant::now());
    let done = shared.publish(events) || shared.is_expired();
    if done {
      break;
    }
  }
}

async fn reconcile_loop<T: ServerTimeSource>(shared: Arc<Shared>, source: T, every: Duration) {
  let mut poll = interval_at(Instant::now() + every, every);
  poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
  loop {
    poll.tick().await;
    if shared.is_expired() {
      break;
    }
    match source.server_time().await {
      Ok(server) => {
        debug!(target: "countdown", remaining = server.remaining_seconds, status = ?server.status, "Server time received");
        let events = lock(&shared.clock).reconcile(&server, Instant::now());
        if shared.publish(events) {
          break;
        }
      }
      Err(e) => {
        warn!(target: "countdown", error = %e, "Server time check failed; keeping local countdown");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::CountdownConfig;
  use crate::protocol::ExamStatus;
  use std::collections::VecDeque;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tokio::time::sleep;

  fn timer_with_counter(remaining: u64) -> (CountdownTimer, Arc<AtomicUsize>) {
    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();
    let clock = CountdownClock::new(remaining, &CountdownConfig::default(), Instant::now());
    let timer = CountdownTimer::new(clock, move || {
      f.fetch_add(1, Ordering::SeqCst);
    });
    (timer, fired)
  }

  struct ScriptedServer(Mutex<VecDeque<Result<ServerTime, ClientError>>>);

  impl ServerTimeSource for ScriptedServer {
    async fn server_time(&self) -> Result<ServerTime, ClientError> {
      let next = self.0.lock().unwrap().pop_front();
      next.unwrap_or_else(|| Err(ClientError::Transport("script exhausted".into())))
    }
  }

  fn in_progress(remaining: i64) -> Result<ServerTime, ClientError> {
    Ok(ServerTime {
      remaining_seconds: remaining,
      status: ExamStatus::InProgress,
      current_time: None,
      start_time: None,
      end_time: None,
    })
  }

  #[tokio::test(start_paused = true)]
  async fn expires_after_ten_seconds_and_fires_once() {
    let (mut timer, fired) = timer_with_counter(10);
    timer.start();

    sleep(Duration::from_millis(9_500)).await;
    assert_eq!(timer.remaining(), 1);
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(timer.phase(), Phase::Expired);
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(timer.set_remaining_seconds(60), Err(ClockError::Expired));
  }

  #[tokio::test(start_paused = true)]
  async fn restart_does_not_double_tick() {
    let (mut timer, _) = timer_with_counter(100);
    timer.start();
    sleep(Duration::from_millis(2_500)).await;
    timer.start();
    timer.start();
    assert_eq!(timer.tasks.len(), 1);
    sleep(Duration::from_millis(1_700)).await; // t=4.2, last tick at 3.5
    assert_eq!(timer.remaining(), 97);
  }

  #[tokio::test(start_paused = true)]
  async fn stopped_timer_does_not_advance_display_until_restarted() {
    let (mut timer, _) = timer_with_counter(100);
    timer.start();
    sleep(Duration::from_millis(3_500)).await;
    timer.stop();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(timer.remaining(), 97);
    // wall-clock anchored: the restart catches up on the time that passed
    timer.start();
    sleep(Duration::from_millis(1_200)).await; // first tick at 14.5
    assert_eq!(timer.remaining(), 86);
  }

  #[tokio::test(start_paused = true)]
  async fn reconciliation_snaps_and_broadcasts() {
    let (mut timer, fired) = timer_with_counter(500);
    let mut events = timer.subscribe();
    let server = ScriptedServer(Mutex::new(VecDeque::from([
      Err(ClientError::Http { status: 502, message: "bad gateway".into() }),
      in_progress(50),
    ])));
    timer.start_with_reconciliation(server, Duration::from_secs(20));

    sleep(Duration::from_millis(20_500)).await;
    assert_eq!(timer.remaining(), 480, "failed check keeps local time");

    sleep(Duration::from_secs(20)).await; // second check at 40s
    assert_eq!(timer.phase(), Phase::Danger);
    assert!(timer.remaining() <= 50);

    let mut saw_reconcile = false;
    while let Ok(ev) = events.try_recv() {
      if let ClockEvent::Reconciled { server, .. } = ev {
        assert_eq!(server, 50);
        saw_reconcile = true;
      }
    }
    assert!(saw_reconcile);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn starting_at_zero_fires_immediately() {
    let (mut timer, fired) = timer_with_counter(0);
    timer.start();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    timer.start();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn host_override_moves_phase() {
    let (mut timer, _) = timer_with_counter(1000);
    timer.start();
    timer.set_remaining_seconds(200).unwrap();
    assert_eq!(timer.phase(), Phase::Warning);
    assert_eq!(timer.display(), "00:03:20");
  }
}
