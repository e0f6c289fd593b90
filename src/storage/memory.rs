//! In-memory [`KeyValueStore`], used by tests and by `--ephemeral` runs.

use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::KeyValueStore;

/// Volatile storage. Can be told to fail every call to exercise degrade paths.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<BTreeMap<String, Vec<u8>>>,
  failing: AtomicBool,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every subsequent call return an error until reset.
  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  fn check(&self) -> Result<()> {
    if self.failing.load(Ordering::SeqCst) {
      return Err(eyre!("Storage unavailable"));
    }
    Ok(())
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    self.check()?;
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(key).cloned())
  }

  fn put(&self, key: &str, value: &[u8]) -> Result<()> {
    self.check()?;
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(key.to_string(), value.to_vec());
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    self.check()?;
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.remove(key);
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    self.check()?;
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      entries
        .keys()
        .filter(|k| k.starts_with(prefix))
        .cloned()
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_failing_store_errors() {
    let store = MemoryStore::new();
    store.put("k", b"v").unwrap();
    store.set_failing(true);
    assert!(store.get("k").is_err());
    assert!(store.put("k", b"w").is_err());
    store.set_failing(false);
    assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
  }
}
