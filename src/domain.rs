//! Domain models: question kinds, answer content encoding, and the answer-save payload.
//!
//! Choice answers are stored by the backend as a JSON array of option ids. The policy
//! here is canonical: ids are de-duplicated and sorted ascending, so the encoded form does
//! not depend on the order in which boxes were ticked.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AnswerError;

/// What kind of question is on screen?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
  /// One or more options ticked; answer is a JSON id array.
  Choice,
  FillBlank,
  Programming,
}

impl QuestionType {
  pub fn is_choice(self) -> bool {
    matches!(self, QuestionType::Choice)
  }
}

/// Decoded answer content, one shape per question type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnswerContent {
  Choice(BTreeSet<u64>),
  Text(String),
}

impl AnswerContent {
  pub fn choices(ids: impl IntoIterator<Item = u64>) -> Self {
    AnswerContent::Choice(ids.into_iter().collect())
  }

  pub fn text(s: impl Into<String>) -> Self {
    AnswerContent::Text(s.into())
  }

  /// Wire form: `[3,7]` for choices, the raw text otherwise.
  pub fn encode(&self) -> String {
    match self {
      AnswerContent::Choice(ids) => {
        let parts: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        format!("[{}]", parts.join(","))
      }
      AnswerContent::Text(s) => s.clone(),
    }
  }

  /// Parse stored content for a question of type `kind`.
  ///
  /// An empty/blank choice answer means "nothing selected". Numeric strings inside the
  /// array (`["3","7"]`) are accepted since older rows were written that way.
  pub fn decode(kind: QuestionType, raw: &str) -> Result<Self, AnswerError> {
    if !kind.is_choice() {
      return Ok(AnswerContent::Text(raw.to_string()));
    }
    if raw.trim().is_empty() {
      return Ok(AnswerContent::Choice(BTreeSet::new()));
    }
    let value: Value = serde_json::from_str(raw)?;
    let Value::Array(items) = value else {
      return Err(AnswerError::NotAnArray);
    };
    let mut ids = BTreeSet::new();
    for item in items {
      let id = match &item {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
      };
      match id {
        Some(id) => {
          ids.insert(id);
        }
        None => return Err(AnswerError::InvalidOption(item.to_string())),
      }
    }
    Ok(AnswerContent::Choice(ids))
  }
}

/// Body of the answer-save endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPayload {
  pub score_id: u64,
  pub question_id: u64,
  pub answer_content: String,
}

impl AnswerPayload {
  pub fn new(score_id: u64, question_id: u64, content: &AnswerContent) -> Self {
    Self { score_id, question_id, answer_content: content.encode() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn choice_encoding_is_sorted_and_deduplicated() {
    let c = AnswerContent::choices([7, 3, 7]);
    assert_eq!(c.encode(), "[3,7]");
    assert_eq!(AnswerContent::choices([]).encode(), "[]");
  }

  #[test]
  fn choice_round_trip_ignores_input_order() {
    let original = AnswerContent::choices([12, 1, 5]);
    let decoded = AnswerContent::decode(QuestionType::Choice, &original.encode()).unwrap();
    assert_eq!(decoded, AnswerContent::choices([5, 12, 1]));
  }

  #[test]
  fn legacy_string_ids_are_accepted() {
    let decoded = AnswerContent::decode(QuestionType::Choice, r#"["7", 3]"#).unwrap();
    assert_eq!(decoded, AnswerContent::choices([3, 7]));
  }

  #[test]
  fn blank_choice_answer_is_empty_selection() {
    let decoded = AnswerContent::decode(QuestionType::Choice, "  ").unwrap();
    assert_eq!(decoded, AnswerContent::Choice(BTreeSet::new()));
  }

  #[test]
  fn non_array_choice_answer_is_rejected() {
    assert!(matches!(
      AnswerContent::decode(QuestionType::Choice, r#"{"a":1}"#),
      Err(AnswerError::NotAnArray)
    ));
    assert!(matches!(
      AnswerContent::decode(QuestionType::Choice, "[true]"),
      Err(AnswerError::InvalidOption(_))
    ));
    assert!(matches!(AnswerContent::decode(QuestionType::Choice, "[1,"), Err(AnswerError::Json(_))));
  }

  #[test]
  fn text_answers_pass_through_untouched() {
    let code = "print('[1,2]')\n";
    let decoded = AnswerContent::decode(QuestionType::Programming, code).unwrap();
    assert_eq!(decoded.encode(), code);
  }

  #[test]
  fn payload_serializes_snake_case() {
    let p = AnswerPayload::new(9, 4, &AnswerContent::choices([7, 3]));
    let json = serde_json::to_value(&p).unwrap();
    assert_eq!(json, serde_json::json!({"score_id": 9, "question_id": 4, "answer_content": "[3,7]"}));
  }
}
