//! Small utility helpers used across modules.

use std::sync::{Mutex, MutexGuard};

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// Used for endpoint paths such as `/exams/{exam_id}/add_question/{question_id}`.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with whole HTML error pages.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Lock a std mutex, recovering the data if a previous holder panicked.
/// Critical sections in this crate are short and never span an `.await`.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
  m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
