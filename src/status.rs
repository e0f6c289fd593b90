//! Pending-count notifications for UI badges and banners.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Snapshot of the outbox as seen by the UI. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
  /// Items still waiting for remote confirmation
  pub pending: usize,
  /// Whether a drain cycle is running
  pub draining: bool,
}

/// Broadcasts a [`SyncStatus`] on every queue-size change.
#[derive(Clone)]
pub struct StatusEmitter {
  tx: broadcast::Sender<SyncStatus>,
  pending: Arc<AtomicUsize>,
  draining: Arc<AtomicBool>,
}

impl StatusEmitter {
  pub fn new() -> Self {
    let (tx, _rx) = broadcast::channel(64);
    Self {
      tx,
      pending: Arc::new(AtomicUsize::new(0)),
      draining: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
    self.tx.subscribe()
  }

  /// Publish a new pending count.
  pub fn emit(&self, pending: usize) {
    self.pending.store(pending, Ordering::SeqCst);
    self.publish();
  }

  pub(crate) fn set_draining(&self, draining: bool) {
    self.draining.store(draining, Ordering::SeqCst);
    self.publish();
  }

  /// Last published status, for consumers that poll instead of subscribing.
  pub fn latest(&self) -> SyncStatus {
    SyncStatus {
      pending: self.pending.load(Ordering::SeqCst),
      draining: self.draining.load(Ordering::SeqCst),
    }
  }

  fn publish(&self) {
    // No receivers is fine
    let _ = self.tx.send(self.latest());
  }
}

impl Default for StatusEmitter {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_emit_without_subscribers() {
    let status = StatusEmitter::new();
    status.emit(3);
    assert_eq!(status.latest().pending, 3);
  }

  #[tokio::test]
  async fn test_subscriber_sees_every_change() {
    let status = StatusEmitter::new();
    let mut rx = status.subscribe();

    status.emit(1);
    status.emit(2);
    status.set_draining(true);

    assert_eq!(rx.recv().await.unwrap().pending, 1);
    assert_eq!(rx.recv().await.unwrap().pending, 2);
    let last = rx.recv().await.unwrap();
    assert!(last.draining);
    assert_eq!(last.pending, 2);
  }
}
