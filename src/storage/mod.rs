//! Durable key-value storage backing the cache snapshots and the outbox.
//!
//! Everything the sync core persists goes through [`KeyValueStore`], so the
//! SQLite file used in production can be swapped for [`MemoryStore`] in tests.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use color_eyre::Result;

/// Key holding the serialized outbox list.
pub const OUTBOX_KEY: &str = "outbox";

/// Prefix for per-collection cache snapshots (`cache:<collection>`).
pub const CACHE_PREFIX: &str = "cache:";

/// Minimal durable key-value interface.
pub trait KeyValueStore: Send + Sync {
  /// Read the value stored under `key`, `None` if it was never written.
  fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

  /// Write `value` under `key`, replacing any previous value.
  fn put(&self, key: &str, value: &[u8]) -> Result<()>;

  /// Remove `key`. Removing a missing key is not an error.
  fn delete(&self, key: &str) -> Result<()>;

  /// List every key starting with `prefix`, sorted.
  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}
