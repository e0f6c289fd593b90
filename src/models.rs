//! Records flowing through the sync core.
//!
//! The core treats records as opaque JSON; this module only gives the facade
//! enough structure to assign ids, pick a collection and order results.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::outbox::MutationKind;

/// Prefix marking ids synthesized on the client for optimistic writes.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Returns true for ids that were synthesized locally and never confirmed by the backend.
pub fn is_local_id(id: &str) -> bool {
  id.starts_with(LOCAL_ID_PREFIX)
}

/// A record type the facade can read and create.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Cache collection (and remote resource) name, e.g. "measures".
  const COLLECTION: &'static str;

  /// Queue kind used when a create has to be deferred.
  const CREATE: MutationKind;

  fn id(&self) -> &str;

  fn set_id(&mut self, id: String);

  /// Ordering applied to every read result, online or cached.
  fn sort_key(&self) -> DateTime<Utc>;
}

/// A body measurement (weight, blood pressure, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
  #[serde(default)]
  pub id: String,
  pub metric: String,
  pub value: f64,
  pub unit: String,
  pub taken_at: DateTime<Utc>,
}

impl Record for Measure {
  const COLLECTION: &'static str = "measures";
  const CREATE: MutationKind = MutationKind::CreateMeasure;

  fn id(&self) -> &str {
    &self.id
  }

  fn set_id(&mut self, id: String) {
    self.id = id;
  }

  fn sort_key(&self) -> DateTime<Utc> {
    self.taken_at
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
  #[serde(default)]
  pub id: String,
  pub name: String,
  pub calories: u32,
  pub eaten_at: DateTime<Utc>,
}

impl Record for Meal {
  const COLLECTION: &'static str = "meals";
  const CREATE: MutationKind = MutationKind::CreateMeal;

  fn id(&self) -> &str {
    &self.id
  }

  fn set_id(&mut self, id: String) {
    self.id = id;
  }

  fn sort_key(&self) -> DateTime<Utc> {
    self.eaten_at
  }
}

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
  User,
  Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  #[serde(default)]
  pub id: String,
  pub role: ChatRole,
  pub content: String,
  pub sent_at: DateTime<Utc>,
}

impl Record for ChatMessage {
  const COLLECTION: &'static str = "chat_history";
  const CREATE: MutationKind = MutationKind::CreateChatMessage;

  fn id(&self) -> &str {
    &self.id
  }

  fn set_id(&mut self, id: String) {
    self.id = id;
  }

  fn sort_key(&self) -> DateTime<Utc> {
    self.sent_at
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_local_ids() {
    assert!(is_local_id("local-1700000000000-abcd1234"));
    assert!(!is_local_id("42"));
    assert!(!is_local_id("9f1c-local"));
  }

  #[test]
  fn test_collections_match_mutation_kinds() {
    assert_eq!(MutationKind::CreateMeasure.collection(), Measure::COLLECTION);
    assert_eq!(MutationKind::CreateMeal.collection(), Meal::COLLECTION);
    assert_eq!(
      MutationKind::CreateChatMessage.collection(),
      ChatMessage::COLLECTION
    );
  }

  #[test]
  fn test_measure_without_id_deserializes() {
    let m: Measure = serde_json::from_value(serde_json::json!({
      "metric": "weight",
      "value": 71.5,
      "unit": "kg",
      "taken_at": "2024-03-01T08:00:00Z"
    }))
    .unwrap();
    assert_eq!(m.id, "");
    assert_eq!(m.metric, "weight");
  }
}
