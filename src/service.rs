//! The sync core as one explicit service object.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::LocalCache;
use crate::connectivity::{ConnectivityMonitor, ConnectivitySource};
use crate::outbox::{MutationKind, QueueItem, WriteQueue};
use crate::remote::RemoteBackend;
use crate::status::StatusEmitter;
use crate::storage::KeyValueStore;
use crate::sync::{DrainReport, SyncProcessor};

/// Owns the cache, the outbox and the processor, built once from injected
/// storage, backend and connectivity.
pub struct SyncCore {
  cache: LocalCache,
  queue: Arc<WriteQueue>,
  processor: Arc<SyncProcessor>,
  remote: Arc<dyn RemoteBackend>,
  connectivity: Arc<dyn ConnectivitySource>,
  status: StatusEmitter,
  inflight: Mutex<Option<JoinHandle<DrainReport>>>,
}

/// Tasks started by [`SyncCore::start`]. Dropping this does not stop them.
pub struct BackgroundTasks {
  pub monitor: JoinHandle<()>,
  pub startup_drain: JoinHandle<DrainReport>,
  pub periodic_drain: JoinHandle<()>,
}

impl BackgroundTasks {
  pub fn abort(&self) {
    self.monitor.abort();
    self.startup_drain.abort();
    self.periodic_drain.abort();
  }
}

impl SyncCore {
  pub fn new(
    store: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteBackend>,
    connectivity: Arc<dyn ConnectivitySource>,
  ) -> Self {
    let status = StatusEmitter::new();
    let cache = LocalCache::new(Arc::clone(&store));
    let queue = Arc::new(WriteQueue::new(store, status.clone()));
    let processor = Arc::new(SyncProcessor::new(
      Arc::clone(&queue),
      Arc::clone(&remote),
      Arc::clone(&connectivity),
      status.clone(),
    ));

    Self {
      cache,
      queue,
      processor,
      remote,
      connectivity,
      status,
      inflight: Mutex::new(None),
    }
  }

  /// Start the connectivity monitor, the delayed startup drain and the
  /// periodic drain.
  pub async fn start(&self, startup_delay: Duration, drain_interval: Duration) -> BackgroundTasks {
    let pending = self.queue.size().await;
    self.status.emit(pending);
    info!(pending, online = self.is_online(), "Sync core started");

    BackgroundTasks {
      monitor: ConnectivityMonitor::spawn(
        Arc::clone(&self.connectivity),
        Arc::clone(&self.processor),
      ),
      startup_drain: self.processor.schedule_startup_drain(startup_delay),
      periodic_drain: self.processor.schedule_periodic_drain(drain_interval),
    }
  }

  /// Queue a mutation; when online, start a drain without waiting for it.
  pub async fn enqueue(&self, kind: MutationKind, payload: Value) -> Option<QueueItem> {
    self.enqueue_item(QueueItem::new(kind, payload)).await
  }

  pub async fn enqueue_item(&self, item: QueueItem) -> Option<QueueItem> {
    let queued = self.queue.enqueue_item(item).await?;
    if self.is_online() {
      debug!(id = %queued.id, "Online, draining right away");
      let handle = self.processor.spawn_drain();
      if let Ok(mut inflight) = self.inflight.lock() {
        *inflight = Some(handle);
      }
    }
    Some(queued)
  }

  /// Wait for the drain started by the latest online enqueue, if any.
  ///
  /// One-shot callers await this before shutting the runtime down.
  pub async fn settle(&self) -> Option<DrainReport> {
    let handle = self.inflight.lock().ok().and_then(|mut inflight| inflight.take())?;
    match handle.await {
      Ok(report) => Some(report),
      Err(e) => {
        warn!(error = %e, "Background drain did not complete");
        None
      }
    }
  }

  pub fn is_online(&self) -> bool {
    self.connectivity.is_online()
  }

  pub fn cache(&self) -> &LocalCache {
    &self.cache
  }

  pub fn queue(&self) -> &Arc<WriteQueue> {
    &self.queue
  }

  pub fn processor(&self) -> &Arc<SyncProcessor> {
    &self.processor
  }

  pub fn remote(&self) -> &Arc<dyn RemoteBackend> {
    &self.remote
  }

  pub fn status(&self) -> &StatusEmitter {
    &self.status
  }
}
