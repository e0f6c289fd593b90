use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Every mutation the data access facade can defer. One per persisted entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
  CreateMeasure,
  CreateMeal,
  CreateChatMessage,
}

impl MutationKind {
  pub const ALL: [MutationKind; 3] = [
    MutationKind::CreateMeasure,
    MutationKind::CreateMeal,
    MutationKind::CreateChatMessage,
  ];

  /// Collection (and remote resource) this mutation writes to.
  pub fn collection(self) -> &'static str {
    match self {
      Self::CreateMeasure => "measures",
      Self::CreateMeal => "meals",
      Self::CreateChatMessage => "chat_history",
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::CreateMeasure => "create_measure",
      Self::CreateMeal => "create_meal",
      Self::CreateChatMessage => "create_chat_message",
    }
  }
}

impl fmt::Display for MutationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A queued mutation. The payload alone must be enough to replay it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
  /// `<unix millis>-<random suffix>`; doubles as the idempotency key on replay
  pub id: String,
  pub kind: MutationKind,
  pub payload: Value,
  pub enqueued_at: DateTime<Utc>,
}

impl QueueItem {
  pub fn new(kind: MutationKind, payload: Value) -> Self {
    let enqueued_at = Utc::now();
    Self {
      id: generate_id(enqueued_at),
      kind,
      payload,
      enqueued_at,
    }
  }
}

/// Timestamp plus random suffix, so no central counter is needed.
fn generate_id(at: DateTime<Utc>) -> String {
  let suffix: String = rand::thread_rng()
    .sample_iter(&Alphanumeric)
    .take(8)
    .map(char::from)
    .collect();
  format!("{}-{}", at.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::collections::HashSet;

  #[test]
  fn test_id_format() {
    let item = QueueItem::new(MutationKind::CreateMeal, json!({}));
    let (millis, suffix) = item.id.split_once('-').unwrap();
    assert_eq!(millis.parse::<i64>().unwrap(), item.enqueued_at.timestamp_millis());
    assert_eq!(suffix.len(), 8);
    assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
  }

  #[test]
  fn test_ids_do_not_collide_in_a_burst() {
    let ids: HashSet<String> = (0..500)
      .map(|_| QueueItem::new(MutationKind::CreateMeasure, json!(null)).id)
      .collect();
    assert_eq!(ids.len(), 500);
  }

  #[test]
  fn test_kind_serializes_snake_case() {
    let value = serde_json::to_value(MutationKind::CreateChatMessage).unwrap();
    assert_eq!(value, json!("create_chat_message"));
    for kind in MutationKind::ALL {
      assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
    }
  }
}
