//! The persisted write queue.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::item::{MutationKind, QueueItem};
use crate::status::StatusEmitter;
use crate::storage::{KeyValueStore, OUTBOX_KEY};

/// FIFO outbox stored as one JSON list under [`OUTBOX_KEY`].
///
/// Producers append through [`WriteQueue::enqueue`]; only the sync processor
/// replaces the list, through [`WriteQueue::write_back`]. Both run their
/// read-modify-write under the same lock.
pub struct WriteQueue {
  store: Arc<dyn KeyValueStore>,
  status: StatusEmitter,
  lock: Mutex<()>,
}

impl WriteQueue {
  pub fn new(store: Arc<dyn KeyValueStore>, status: StatusEmitter) -> Self {
    Self {
      store,
      status,
      lock: Mutex::new(()),
    }
  }

  /// Append a mutation to the end of the queue.
  ///
  /// Persistence failures are swallowed: the item is lost and `None` is returned.
  pub async fn enqueue(&self, kind: MutationKind, payload: Value) -> Option<QueueItem> {
    self.enqueue_item(QueueItem::new(kind, payload)).await
  }

  /// Append an already built item, keeping its id (used when an online write
  /// fails and the same mutation is deferred).
  pub async fn enqueue_item(&self, item: QueueItem) -> Option<QueueItem> {
    let kind = item.kind;
    let _guard = self.lock.lock().await;

    let mut items = match self.load() {
      Ok(items) => items,
      Err(e) => {
        warn!(kind = %kind, error = %e, "Failed to load outbox, dropping mutation");
        return None;
      }
    };
    items.push(item.clone());

    if let Err(e) = self.persist(&items) {
      warn!(kind = %kind, error = %e, "Failed to persist outbox, dropping mutation");
      return None;
    }

    info!(id = %item.id, kind = %kind, pending = items.len(), "Queued mutation");
    self.status.emit(items.len());
    Some(item)
  }

  /// Number of pending items; 0 when storage is unreadable.
  pub async fn size(&self) -> usize {
    let _guard = self.lock.lock().await;
    match self.load() {
      Ok(items) => items.len(),
      Err(e) => {
        warn!(error = %e, "Failed to read outbox size");
        0
      }
    }
  }

  /// Current queue contents in FIFO order.
  pub async fn items(&self) -> Result<Vec<QueueItem>> {
    let _guard = self.lock.lock().await;
    self.load()
  }

  /// Persist the outcome of a drain cycle.
  ///
  /// `retained` are the snapshot items that failed, in snapshot order. Items that
  /// were appended after the snapshot (ids not in `snapshot_ids`) are kept after
  /// them, in their persisted order, so a concurrent enqueue is never overwritten.
  pub async fn write_back(
    &self,
    snapshot_ids: &HashSet<String>,
    retained: Vec<QueueItem>,
  ) -> Result<usize> {
    let _guard = self.lock.lock().await;

    let current = self.load()?;
    let arrived: Vec<QueueItem> = current
      .into_iter()
      .filter(|item| !snapshot_ids.contains(&item.id))
      .collect();

    if !arrived.is_empty() {
      debug!(count = arrived.len(), "Merging items queued during drain");
    }

    let mut merged = retained;
    merged.extend(arrived);

    self.persist(&merged)?;
    self.status.emit(merged.len());
    Ok(merged.len())
  }

  /// Drop every pending item.
  pub async fn clear(&self) -> Result<usize> {
    let _guard = self.lock.lock().await;
    let dropped = self.load()?.len();
    self.store.delete(OUTBOX_KEY)?;
    warn!(dropped, "Outbox cleared");
    self.status.emit(0);
    Ok(dropped)
  }

  fn load(&self) -> Result<Vec<QueueItem>> {
    match self.store.get(OUTBOX_KEY)? {
      Some(bytes) => {
        serde_json::from_slice(&bytes).map_err(|e| eyre!("Failed to decode outbox: {}", e))
      }
      None => Ok(Vec::new()),
    }
  }

  fn persist(&self, items: &[QueueItem]) -> Result<()> {
    let bytes =
      serde_json::to_vec(items).map_err(|e| eyre!("Failed to serialize outbox: {}", e))?;
    self.store.put(OUTBOX_KEY, &bytes)
  }
}
