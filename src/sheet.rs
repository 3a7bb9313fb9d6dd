//! In-memory model of the exam-taking page: which question is open and what the
//! student has entered for it. Acts as the payload producer for answer autosave.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::domain::{AnswerContent, AnswerPayload, QuestionType};
use crate::error::CollectError;
use crate::protocol::Question;

#[derive(Clone, Debug)]
struct OpenQuestion {
  id: u64,
  kind: QuestionType,
  selected: BTreeSet<u64>,
  text: String,
}

#[derive(Clone, Debug)]
pub struct AnswerSheet {
  score_id: u64,
  current: Option<OpenQuestion>,
}

impl AnswerSheet {
  pub fn new(score_id: u64) -> Self {
    Self { score_id, current: None }
  }

  pub fn current_question(&self) -> Option<u64> {
    self.current.as_ref().map(|q| q.id)
  }

  /// Open `question`, restoring its previously saved answer.
  /// A saved choice answer that cannot be decoded is logged and treated as empty.
  pub fn open(&mut self, question: &Question) {
    let saved = question.saved_answer.as_deref().unwrap_or_default();
    let mut open = OpenQuestion {
      id: question.id,
      kind: question.question_type,
      selected: BTreeSet::new(),
      text: String::new(),
    };
    match AnswerContent::decode(question.question_type, saved) {
      Ok(AnswerContent::Choice(ids)) => open.selected = ids,
      Ok(AnswerContent::Text(t)) if !t.trim().is_empty() => open.text = t,
      Ok(AnswerContent::Text(_)) => {
        if let Some(tpl) = &question.answer_template {
          open.text = tpl.clone();
        }
      }
      Err(e) => {
        warn!(target: "autosave", question_id = question.id, error = %e, raw = %saved, "Saved choice answer unreadable; starting empty");
      }
    }
    debug!(target: "autosave", question_id = open.id, kind = ?open.kind, "Question opened");
    self.current = Some(open);
  }

  /// Tick or untick an option of the open choice question.
  pub fn set_option(&mut self, option_id: u64, checked: bool) {
    if let Some(q) = self.current.as_mut() {
      if checked {
        q.selected.insert(option_id);
      } else {
        q.selected.remove(&option_id);
      }
    }
  }

  /// Replace the free-text answer of the open question.
  pub fn set_text(&mut self, text: impl Into<String>) {
    if let Some(q) = self.current.as_mut() {
      q.text = text.into();
    }
  }

  pub fn content(&self) -> Option<AnswerContent> {
    self.current.as_ref().map(|q| match q.kind {
      QuestionType::Choice => AnswerContent::Choice(q.selected.clone()),
      QuestionType::FillBlank | QuestionType::Programming => AnswerContent::Text(q.text.clone()),
    })
  }

  /// Build the save payload for the open question.
  pub fn payload(&self) -> Result<Option<AnswerPayload>, CollectError> {
    let q = self.current.as_ref().ok_or(CollectError::NoQuestionSelected)?;
    let content = self.content().ok_or(CollectError::NoQuestionSelected)?;
    Ok(Some(AnswerPayload::new(self.score_id, q.id, &content)))
  }
}
