//! Local cache store over the durable key-value storage.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::traits::CacheLookup;
use crate::storage::{KeyValueStore, CACHE_PREFIX};

/// Per-collection snapshot store used as the read fallback.
///
/// Storage errors never reach the caller: writes are dropped and reads degrade
/// to an empty (or [`CacheLookup::Unavailable`]) result.
#[derive(Clone)]
pub struct LocalCache {
  store: Arc<dyn KeyValueStore>,
  /// Serializes read-modify-write of a snapshot (optimistic appends)
  write_lock: Arc<Mutex<()>>,
}

impl LocalCache {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self {
      store,
      write_lock: Arc::new(Mutex::new(())),
    }
  }

  fn key(name: &str) -> String {
    format!("{}{}", CACHE_PREFIX, name)
  }

  /// Replace the contents of `name` with `records`.
  pub fn replace_collection<T: Serialize>(&self, name: &str, records: &[T]) {
    let values: Vec<Value> = match records
      .iter()
      .map(serde_json::to_value)
      .collect::<std::result::Result<Vec<Value>, _>>()
    {
      Ok(values) => values,
      Err(e) => {
        warn!(collection = name, error = %e, "Failed to serialize records, cache not updated");
        return;
      }
    };

    let Ok(_guard) = self.write_lock.lock() else {
      warn!(collection = name, "Cache lock poisoned, cache not updated");
      return;
    };

    match self.write_values(name, &values) {
      Ok(()) => debug!(collection = name, count = values.len(), "Cache replaced"),
      Err(e) => warn!(collection = name, error = %e, "Failed to write cache snapshot"),
    }
  }

  /// All cached records of `name`. Empty when never populated or unreadable.
  pub fn read_collection<T: DeserializeOwned>(&self, name: &str) -> Vec<T> {
    self.lookup_collection(name).into_records()
  }

  /// Read `name`, keeping miss, empty and storage failure apart.
  pub fn lookup_collection<T: DeserializeOwned>(&self, name: &str) -> CacheLookup<T> {
    let values = match self.read_values(name) {
      Ok(Some(values)) => values,
      Ok(None) => return CacheLookup::Miss,
      Err(e) => {
        warn!(collection = name, error = %e, "Cache unavailable");
        return CacheLookup::Unavailable;
      }
    };

    if values.is_empty() {
      return CacheLookup::Empty;
    }

    let records = values
      .into_iter()
      .filter_map(|value| match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
          debug!(collection = name, error = %e, "Skipping undecodable cached record");
          None
        }
      })
      .collect();

    CacheLookup::Hit(records)
  }

  /// Append one record to the snapshot of `name` (optimistic writes).
  pub fn append_record<T: Serialize>(&self, name: &str, record: &T) {
    let value = match serde_json::to_value(record) {
      Ok(value) => value,
      Err(e) => {
        warn!(collection = name, error = %e, "Failed to serialize optimistic record");
        return;
      }
    };

    let Ok(_guard) = self.write_lock.lock() else {
      warn!(collection = name, "Cache lock poisoned, optimistic record dropped");
      return;
    };

    let result = self.read_values(name).and_then(|existing| {
      let mut values = existing.unwrap_or_default();
      values.push(value);
      self.write_values(name, &values)
    });

    if let Err(e) = result {
      warn!(collection = name, error = %e, "Failed to append optimistic record");
    }
  }

  /// Names of every populated collection.
  pub fn collections(&self) -> Vec<String> {
    match self.store.keys_with_prefix(CACHE_PREFIX) {
      Ok(keys) => keys
        .into_iter()
        .filter_map(|k| k.strip_prefix(CACHE_PREFIX).map(String::from))
        .collect(),
      Err(e) => {
        warn!(error = %e, "Failed to list cached collections");
        Vec::new()
      }
    }
  }

  fn read_values(&self, name: &str) -> Result<Option<Vec<Value>>> {
    match self.store.get(&Self::key(name))? {
      Some(bytes) => serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| eyre!("Failed to decode cache snapshot {}: {}", name, e)),
      None => Ok(None),
    }
  }

  fn write_values(&self, name: &str, values: &[Value]) -> Result<()> {
    let bytes = serde_json::to_vec(values)
      .map_err(|e| eyre!("Failed to serialize cache snapshot {}: {}", name, e))?;
    self.store.put(&Self::key(name), &bytes)
  }
}
