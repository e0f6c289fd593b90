use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::connectivity::ConnectivitySource;
use crate::outbox::WriteQueue;
use crate::remote::RemoteBackend;
use crate::status::StatusEmitter;

/// Outcome of one call to [`SyncProcessor::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
  /// The call was a no-op: offline, or another cycle was running
  pub skipped: bool,
  /// Items in the snapshot
  pub attempted: usize,
  /// Items the backend confirmed
  pub delivered: usize,
  /// Snapshot items kept for a later cycle
  pub retained: usize,
  /// Queue length after write-back, including items queued during the cycle
  pub remaining: usize,
}

impl DrainReport {
  fn skipped() -> Self {
    Self {
      skipped: true,
      ..Self::default()
    }
  }
}

/// Drains the outbox in FIFO order, one item at a time.
///
/// Idle -> Draining -> Idle, with a single flag ensuring at most one cycle runs.
/// A trigger arriving mid-cycle is dropped; later triggers pick up what is left.
pub struct SyncProcessor {
  queue: Arc<WriteQueue>,
  remote: Arc<dyn RemoteBackend>,
  connectivity: Arc<dyn ConnectivitySource>,
  status: StatusEmitter,
  draining: AtomicBool,
}

/// Resets the draining flag when a cycle ends, whichever way it ends.
struct DrainGuard<'a> {
  flag: &'a AtomicBool,
  status: &'a StatusEmitter,
}

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) {
    self.flag.store(false, Ordering::SeqCst);
    self.status.set_draining(false);
  }
}

impl SyncProcessor {
  pub fn new(
    queue: Arc<WriteQueue>,
    remote: Arc<dyn RemoteBackend>,
    connectivity: Arc<dyn ConnectivitySource>,
    status: StatusEmitter,
  ) -> Self {
    Self {
      queue,
      remote,
      connectivity,
      status,
      draining: AtomicBool::new(false),
    }
  }

  pub fn is_draining(&self) -> bool {
    self.draining.load(Ordering::SeqCst)
  }

  /// Run one drain cycle over a snapshot of the queue.
  pub async fn drain(&self) -> DrainReport {
    if !self.connectivity.is_online() {
      debug!("Offline, drain skipped");
      return DrainReport::skipped();
    }

    if self
      .draining
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      debug!("Drain already running, trigger dropped");
      return DrainReport::skipped();
    }
    let _guard = DrainGuard {
      flag: &self.draining,
      status: &self.status,
    };
    self.status.set_draining(true);

    let snapshot = match self.queue.items().await {
      Ok(items) => items,
      Err(e) => {
        warn!(error = %e, "Failed to read outbox, drain aborted");
        return DrainReport::default();
      }
    };

    if snapshot.is_empty() {
      return DrainReport::default();
    }

    let attempted = snapshot.len();
    info!(pending = attempted, "Draining outbox");

    let snapshot_ids: HashSet<String> = snapshot.iter().map(|item| item.id.clone()).collect();
    let mut retained = Vec::new();

    // One at a time, in enqueue order
    for item in snapshot {
      match self.remote.apply(&item).await {
        Ok(_) => debug!(id = %item.id, kind = %item.kind, "Replayed"),
        Err(e) => {
          warn!(id = %item.id, kind = %item.kind, error = %e, "Replay failed, keeping for next cycle");
          retained.push(item);
        }
      }
    }

    let retained_count = retained.len();
    let remaining = match self.queue.write_back(&snapshot_ids, retained).await {
      Ok(remaining) => remaining,
      Err(e) => {
        // Delivered items stay queued and will be replayed again
        error!(error = %e, "Failed to persist drain result");
        self.queue.size().await
      }
    };

    let report = DrainReport {
      skipped: false,
      attempted,
      delivered: attempted - retained_count,
      retained: retained_count,
      remaining,
    };
    info!(
      delivered = report.delivered,
      retained = report.retained,
      remaining = report.remaining,
      "Drain finished"
    );
    report
  }

  /// Start a drain in the background without waiting for it.
  pub fn spawn_drain(self: &Arc<Self>) -> JoinHandle<DrainReport> {
    let processor = Arc::clone(self);
    tokio::spawn(async move { processor.drain().await })
  }

  /// Drain once after `delay`, catching work queued by a previous session.
  pub fn schedule_startup_drain(self: &Arc<Self>, delay: Duration) -> JoinHandle<DrainReport> {
    let processor = Arc::clone(self);
    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      debug!("Startup drain");
      processor.drain().await
    })
  }

  /// Drain every `interval` until aborted.
  ///
  /// Catches items whose trigger was dropped: queued during a running cycle,
  /// or retained by a failed replay while connectivity stayed up.
  pub fn schedule_periodic_drain(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
    let processor = Arc::clone(self);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let report = processor.drain().await;
        if report.attempted > 0 {
          debug!(delivered = report.delivered, retained = report.retained, "Periodic drain");
        }
      }
    })
  }
}
