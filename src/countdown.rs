//! Exam countdown as a pure state machine.
//!
//! Phases move Running → Warning → Danger → Expired as time runs out. Remaining time is
//! derived from an anchor (`anchor_remaining` seconds left at instant `anchor`) and the
//! elapsed wall time, so late or coalesced ticks catch up instead of drifting.
//! A server reconciliation replaces the anchor; if it reports more time than we had, the
//! phase moves back up accordingly. Expired is terminal.
//!
//! Time is injected (`now`) so the machine can be driven by tests or by `CountdownTimer`.

use tokio::time::Instant;

use crate::config::CountdownConfig;
use crate::error::ClockError;
use crate::protocol::{ExamStatus, ServerTime};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
  Running,
  Warning,
  Danger,
  Expired,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClockEvent {
  Tick { remaining: u64 },
  PhaseChanged { from: Phase, to: Phase },
  /// Local value replaced by the server's.
  Reconciled { local: u64, server: u64 },
  /// Emitted once, when the clock enters `Expired`.
  Expired,
}

#[derive(Clone, Copy, Debug)]
struct Thresholds {
  warning: u64,
  danger: u64,
  reconcile: u64,
}

#[derive(Clone, Debug)]
pub struct CountdownClock {
  anchor: Instant,
  anchor_remaining: u64,
  remaining: u64,
  phase: Phase,
  thresholds: Thresholds,
}

impl CountdownClock {
  pub fn new(remaining: u64, config: &CountdownConfig, now: Instant) -> Self {
    let thresholds = Thresholds {
      warning: config.warning_threshold_secs,
      danger: config.danger_threshold_secs,
      reconcile: config.reconcile_threshold_secs,
    };
    Self {
      anchor: now,
      anchor_remaining: remaining,
      remaining,
      phase: phase_for(remaining, thresholds),
      thresholds,
    }
  }

  pub fn remaining(&self) -> u64 {
    self.remaining
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn is_expired(&self) -> bool {
    self.phase == Phase::Expired
  }

  /// Advance to `now`. Remaining time never increases here.
  pub fn tick(&mut self, now: Instant) -> Vec<ClockEvent> {
    let mut events = Vec::new();
    if self.is_expired() {
      return events;
    }
    let elapsed = now.saturating_duration_since(self.anchor).as_secs();
    let next = self.anchor_remaining.saturating_sub(elapsed);
    if next < self.remaining {
      self.remaining = next;
      events.push(ClockEvent::Tick { remaining: next });
    }
    self.update_phase(&mut events);
    events
  }

  /// Compare against the server's view of the exam.
  ///
  /// `ended` expires the clock outright. `in_progress` snaps to the server value when the
  /// two disagree by more than the reconcile threshold. `not_started` is left alone.
  pub fn reconcile(&mut self, server: &ServerTime, now: Instant) -> Vec<ClockEvent> {
    let mut events = Vec::new();
    if self.is_expired() {
      return events;
    }
    // bring local up to date first so the comparison is fair
    events.extend(self.tick(now));
    if self.is_expired() {
      return events;
    }
    match server.status {
      ExamStatus::Ended => {
        self.rebase(0, now);
        self.update_phase(&mut events);
      }
      ExamStatus::InProgress => {
        let server_remaining = server.remaining();
        if self.remaining.abs_diff(server_remaining) > self.thresholds.reconcile {
          events.push(ClockEvent::Reconciled { local: self.remaining, server: server_remaining });
          self.rebase(server_remaining, now);
          self.update_phase(&mut events);
        }
      }
      ExamStatus::NotStarted => {}
    }
    events
  }

  /// Host override of the remaining time; refused once expired.
  pub fn set_remaining(&mut self, seconds: u64, now: Instant) -> Result<Vec<ClockEvent>, ClockError> {
    if self.is_expired() {
      return Err(ClockError::Expired);
    }
    let mut events = Vec::new();
    self.rebase(seconds, now);
    events.push(ClockEvent::Tick { remaining: seconds });
    self.update_phase(&mut events);
    Ok(events)
  }

  /// `HH:MM:SS`; hours are not capped at 24.
  pub fn display(&self) -> String {
    format_hms(self.remaining)
  }

  fn rebase(&mut self, remaining: u64, now: Instant) {
    self.anchor = now;
    self.anchor_remaining = remaining;
    self.remaining = remaining;
  }

  fn update_phase(&mut self, events: &mut Vec<ClockEvent>) {
    let to = phase_for(self.remaining, self.thresholds);
    if to == self.phase {
      return;
    }
    events.push(ClockEvent::PhaseChanged { from: self.phase, to });
    self.phase = to;
    if to == Phase::Expired {
      events.push(ClockEvent::Expired);
    }
  }
}

fn phase_for(remaining: u64, t: Thresholds) -> Phase {
  if remaining == 0 {
    Phase::Expired
  } else if remaining <= t.danger {
    Phase::Danger
  } else if remaining <= t.warning {
    Phase::Warning
  } else {
    Phase::Running
  }
}

pub fn format_hms(secs: u64) -> String {
  format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn cfg() -> CountdownConfig {
    CountdownConfig::default()
  }

  fn server(remaining: i64, status: ExamStatus) -> ServerTime {
    ServerTime { remaining_seconds: remaining, status, current_time: None, start_time: None, end_time: None }
  }

  #[test]
  fn ten_one_second_ticks_expire_exactly_once() {
    let t0 = Instant::now();
    let mut clock = CountdownClock::new(10, &cfg(), t0);
    let mut expired = 0;
    for i in 1..=10 {
      let events = clock.tick(t0 + Duration::from_secs(i));
      expired += events.iter().filter(|e| **e == ClockEvent::Expired).count();
    }
    assert!(clock.is_expired());
    assert_eq!(clock.remaining(), 0);
    assert_eq!(expired, 1);

    assert!(clock.tick(t0 + Duration::from_secs(11)).is_empty());
    assert!(clock.tick(t0 + Duration::from_secs(60)).is_empty());
  }

  #[test]
  fn late_tick_catches_up_on_elapsed_time() {
    let t0 = Instant::now();
    let mut clock = CountdownClock::new(400, &cfg(), t0);
    // tab slept for two minutes
    let events = clock.tick(t0 + Duration::from_millis(120_400));
    assert_eq!(clock.remaining(), 280);
    assert_eq!(
      events,
      vec![
        ClockEvent::Tick { remaining: 280 },
        ClockEvent::PhaseChanged { from: Phase::Running, to: Phase::Warning },
      ]
    );
  }

  #[test]
  fn sub_second_ticks_do_not_lose_time() {
    let t0 = Instant::now();
    let mut clock = CountdownClock::new(100, &cfg(), t0);
    for ms in (300..=3000).step_by(300) {
      clock.tick(t0 + Duration::from_millis(ms));
    }
    assert_eq!(clock.remaining(), 97);
  }

  #[test]
  fn reconciliation_snaps_straight_into_danger() {
    let t0 = Instant::now();
    let mut clock = CountdownClock::new(500, &cfg(), t0);
    assert_eq!(clock.phase(), Phase::Running);

    let events = clock.reconcile(&server(50, ExamStatus::InProgress), t0);
    assert_eq!(clock.remaining(), 50);
    assert_eq!(clock.phase(), Phase::Danger);
    assert_eq!(
      events,
      vec![
        ClockEvent::Reconciled { local: 500, server: 50 },
        ClockEvent::PhaseChanged { from: Phase::Running, to: Phase::Danger },
      ]
    );

    // anchor was rebased: 5s later we are at 45, not 495 - 5
    clock.tick(t0 + Duration::from_secs(5));
    assert_eq!(clock.remaining(), 45);
  }

  #[test]
  fn small_disagreement_is_tolerated() {
    let t0 = Instant::now();
    let mut clock = CountdownClock::new(500, &cfg(), t0);
    assert!(clock.reconcile(&server(490, ExamStatus::InProgress), t0).is_empty());
    assert_eq!(clock.remaining(), 500);
  }

  #[test]
  fn extra_time_from_server_downgrades_phase() {
    let t0 = Instant::now();
    let mut clock = CountdownClock::new(30, &cfg(), t0);
    assert_eq!(clock.phase(), Phase::Danger);
    let events = clock.reconcile(&server(900, ExamStatus::InProgress), t0);
    assert_eq!(clock.phase(), Phase::Running);
    assert!(events.contains(&ClockEvent::PhaseChanged { from: Phase::Danger, to: Phase::Running }));
  }

  #[test]
  fn server_end_forces_expiry() {
    let t0 = Instant::now();
    let mut clock = CountdownClock::new(3600, &cfg(), t0);
    let events = clock.reconcile(&server(0, ExamStatus::Ended), t0);
    assert!(clock.is_expired());
    assert_eq!(events.last(), Some(&ClockEvent::Expired));
    assert!(clock.reconcile(&server(100, ExamStatus::InProgress), t0).is_empty());
  }

  #[test]
  fn not_started_is_ignored() {
    let t0 = Instant::now();
    let mut clock = CountdownClock::new(3600, &cfg(), t0);
    assert!(clock.reconcile(&server(600, ExamStatus::NotStarted), t0).is_empty());
    assert_eq!(clock.remaining(), 3600);
  }

  #[test]
  fn set_remaining_rebases_and_is_refused_after_expiry() {
    let t0 = Instant::now();
    let mut clock = CountdownClock::new(100, &cfg(), t0);
    clock.set_remaining(1000, t0 + Duration::from_secs(50)).unwrap();
    clock.tick(t0 + Duration::from_secs(60));
    assert_eq!(clock.remaining(), 990);

    clock.set_remaining(0, t0 + Duration::from_secs(61)).unwrap();
    assert!(clock.is_expired());
    assert_eq!(clock.set_remaining(10, t0 + Duration::from_secs(62)), Err(ClockError::Expired));
  }

  #[test]
  fn threshold_boundaries_are_inclusive() {
    let t0 = Instant::now();
    assert_eq!(CountdownClock::new(301, &cfg(), t0).phase(), Phase::Running);
    assert_eq!(CountdownClock::new(300, &cfg(), t0).phase(), Phase::Warning);
    assert_eq!(CountdownClock::new(60, &cfg(), t0).phase(), Phase::Danger);
    assert_eq!(CountdownClock::new(0, &cfg(), t0).phase(), Phase::Expired);
  }

  #[test]
  fn display_pads_each_field() {
    assert_eq!(format_hms(0), "00:00:00");
    assert_eq!(format_hms(3725), "01:02:05");
    assert_eq!(format_hms(90_000), "25:00:00");
  }
}
