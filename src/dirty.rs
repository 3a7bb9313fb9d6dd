//! Unsaved-change tracking.
//!
//! The tracker only flips flags and reports status changes through an optional hook;
//! showing or hiding a "saved" indicator is the hook owner's job.

use chrono::NaiveDateTime;

/// Status change reported to the hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirtyStatus {
  /// Local state now differs from the server; hide any "saved" indicator.
  Unsaved,
  /// Local state matches what the server confirmed at this time.
  Saved(NaiveDateTime),
}

pub type StatusHook = Box<dyn Fn(&DirtyStatus) + Send + Sync>;

#[derive(Default)]
pub struct DirtyTracker {
  dirty: bool,
  /// Bumped on every `mark_dirty`, so a save can tell whether edits raced it.
  revision: u64,
  last_saved_at: Option<NaiveDateTime>,
  hook: Option<StatusHook>,
}

impl std::fmt::Debug for DirtyTracker {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DirtyTracker")
      .field("dirty", &self.dirty)
      .field("revision", &self.revision)
      .field("last_saved_at", &self.last_saved_at)
      .finish()
  }
}

impl DirtyTracker {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_hook(hook: impl Fn(&DirtyStatus) + Send + Sync + 'static) -> Self {
    Self { hook: Some(Box::new(hook)), ..Self::default() }
  }

  pub fn mark_dirty(&mut self) {
    self.revision = self.revision.wrapping_add(1);
    let was_dirty = self.dirty;
    self.dirty = true;
    if !was_dirty {
      self.notify(&DirtyStatus::Unsaved);
    }
  }

  pub fn mark_clean(&mut self, at: NaiveDateTime) {
    self.dirty = false;
    self.last_saved_at = Some(at);
    self.notify(&DirtyStatus::Saved(at));
  }

  /// Record a save that was collected at `revision`.
  /// Clears dirty only if nothing was edited since; returns whether it did.
  pub fn settle(&mut self, revision: u64, at: NaiveDateTime) -> bool {
    self.last_saved_at = Some(at);
    if revision == self.revision {
      self.mark_clean(at);
      true
    } else {
      false
    }
  }

  /// Drop pending changes without recording a save (e.g. the exam was submitted).
  pub fn discard(&mut self) {
    self.dirty = false;
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  pub fn revision(&self) -> u64 {
    self.revision
  }

  pub fn last_saved_at(&self) -> Option<NaiveDateTime> {
    self.last_saved_at
  }

  fn notify(&self, status: &DirtyStatus) {
    if let Some(hook) = &self.hook {
      hook(status);
    }
  }
}
