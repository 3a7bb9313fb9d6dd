//! Form snapshots for the exam-authoring draft endpoint.

use serde::Serialize;
use serde_json::{Map, Value};

/// Key/value snapshot of an authoring form.
///
/// Multi-valued fields use the `name[]` convention: every entry is pushed onto an array
/// stored under `name`. When an entity id is known it is written to `id`, replacing any
/// form field of that name.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DraftSnapshot(Map<String, Value>);

impl DraftSnapshot {
  pub fn from_form<I, K, V>(entries: I, entity_id: Option<u64>) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
  {
    let mut fields = Map::new();
    for (key, value) in entries {
      let key = key.as_ref();
      let value = Value::String(value.into());
      match key.strip_suffix("[]") {
        Some(base) => match fields.get_mut(base) {
          Some(Value::Array(items)) => items.push(value),
          _ => {
            fields.insert(base.to_string(), Value::Array(vec![value]));
          }
        },
        None => {
          fields.insert(key.to_string(), value);
        }
      }
    }
    if let Some(id) = entity_id {
      fields.insert("id".into(), Value::from(id));
    }
    Self(fields)
  }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    self.0.insert(key.into(), value.into());
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }
}
