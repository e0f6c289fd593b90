//! SQLite implementation of [`KeyValueStore`].

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::KeyValueStore;

/// SQLite-based key-value storage.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the store at `path`, or at the default location when `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open storage database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a throwaway in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("vitalsync").join("vitalsync.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run storage migrations: {}", e))?;

    Ok(())
  }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to read key {}: {}", key, e))
  }

  fn put(&self, key: &str, value: &[u8]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write key {}: {}", key, e))?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete key {}: {}", key, e))?;

    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT key FROM kv WHERE substr(key, 1, ?) = ? ORDER BY key")
      .map_err(|e| eyre!("Failed to prepare key listing: {}", e))?;

    let keys = stmt
      .query_map(params![prefix.len(), prefix], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list keys: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_put_then_get() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.put("outbox", b"[]").unwrap();
    assert_eq!(store.get("outbox").unwrap(), Some(b"[]".to_vec()));
  }

  #[test]
  fn test_missing_key_is_none() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert_eq!(store.get("nope").unwrap(), None);
  }

  #[test]
  fn test_put_overwrites() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.put("k", b"one").unwrap();
    store.put("k", b"two").unwrap();
    assert_eq!(store.get("k").unwrap(), Some(b"two".to_vec()));
  }

  #[test]
  fn test_delete() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.put("k", b"v").unwrap();
    store.delete("k").unwrap();
    store.delete("k").unwrap();
    assert_eq!(store.get("k").unwrap(), None);
  }

  #[test]
  fn test_keys_with_prefix() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.put("cache:meals", b"[]").unwrap();
    store.put("cache:measures", b"[]").unwrap();
    store.put("outbox", b"[]").unwrap();

    let keys = store.keys_with_prefix("cache:").unwrap();
    assert_eq!(keys, vec!["cache:meals", "cache:measures"]);
  }

  #[test]
  fn test_survives_reopen() {
    let dir = std::env::temp_dir().join(format!("vitalsync-test-{}", std::process::id()));
    let path = dir.join("reopen.db");
    let _ = std::fs::remove_file(&path);

    {
      let store = SqliteStore::open(Some(&path)).unwrap();
      store.put("outbox", b"[1]").unwrap();
    }

    let store = SqliteStore::open(Some(&path)).unwrap();
    assert_eq!(store.get("outbox").unwrap(), Some(b"[1]".to_vec()));
    let _ = std::fs::remove_dir_all(&dir);
  }
}
