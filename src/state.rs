//! Per-session save state shared between the host-facing handle and the pump task.
//!
//! `saving` is the only guard against overlapping requests: it is set before the payload
//! is collected and cleared when the attempt is abandoned or the request resolves.

use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;

use crate::dirty::DirtyTracker;

/// Read-only snapshot handed to hosts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveState {
    pub dirty: bool,
    pub saving: bool,
    pub last_saved_at: Option<NaiveDateTime>,
}

/// Why an attempt was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Periodic,
    Debounce,
    Manual,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Periodic => "periodic",
            Trigger::Debounce => "debounce",
            Trigger::Manual => "manual",
        }
    }
}

#[derive(Debug)]
pub struct SessionState {
    pub tracker: DirtyTracker,
    pub saving: bool,
    /// Cleared by `stop()`; periodic and debounced attempts are ignored meanwhile.
    pub enabled: bool,
    /// Set once the exam is handed in; the unload guard no longer applies.
    pub submitted: bool,
}

pub type SharedState = Arc<Mutex<SessionState>>;

impl SessionState {
    pub fn new(tracker: DirtyTracker) -> Self {
        Self { tracker, saving: false, enabled: true, submitted: false }
    }

    pub fn snapshot(&self) -> SaveState {
        SaveState {
            dirty: self.tracker.is_dirty(),
            saving: self.saving,
            last_saved_at: self.tracker.last_saved_at(),
        }
    }

    /// Claim the in-flight slot for an attempt.
    ///
    /// Returns the dirty revision the payload will represent, or `None` when the attempt
    /// must not run: another save is outstanding, or (for automatic triggers) autosave is
    /// stopped or there is nothing to save.
    pub fn try_begin(&mut self, trigger: Trigger) -> Option<u64> {
        if self.saving {
            return None;
        }
        if trigger != Trigger::Manual && (!self.enabled || !self.tracker.is_dirty()) {
            return None;
        }
        self.saving = true;
        Some(self.tracker.revision())
    }

    pub fn finish(&mut self) {
        self.saving = false;
    }

    /// Whether leaving the page now should trigger a confirmation prompt.
    pub fn should_confirm_leave(&self) -> bool {
        self.tracker.is_dirty() && self.enabled && !self.submitted
    }
}
