//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

use crate::connectivity::ManualConnectivity;
use crate::outbox::QueueItem;
use crate::remote::RemoteBackend;
use crate::service::SyncCore;
use crate::status::SyncStatus;
use crate::storage::MemoryStore;

/// Lets a test hold a replay in flight.
#[derive(Clone, Default)]
pub struct Gate {
  /// Notified when the paused replay starts
  pub reached: Arc<Notify>,
  /// Notify to let the paused replay finish
  pub release: Arc<Notify>,
}

/// Scripted in-memory backend.
///
/// Items are identified by a `"label"` field in their payload when a test needs
/// to single one out.
#[derive(Default)]
pub struct FakeRemote {
  collections: Mutex<HashMap<String, Vec<Value>>>,
  applied: Mutex<Vec<QueueItem>>,
  failing_labels: Mutex<HashSet<String>>,
  fail_reads: AtomicBool,
  fail_writes: AtomicBool,
  pause: Mutex<Option<(String, Gate)>>,
  next_id: AtomicUsize,
  fetches: AtomicUsize,
}

impl FakeRemote {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_collection(&self, name: &str, records: Vec<Value>) {
    self
      .collections
      .lock()
      .unwrap()
      .insert(name.to_string(), records);
  }

  pub fn fail_label(&self, label: &str) {
    self.failing_labels.lock().unwrap().insert(label.to_string());
  }

  pub fn set_fail_reads(&self, fail: bool) {
    self.fail_reads.store(fail, Ordering::SeqCst);
  }

  pub fn set_fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  /// Clear every scripted failure.
  pub fn recover(&self) {
    self.failing_labels.lock().unwrap().clear();
    self.set_fail_reads(false);
    self.set_fail_writes(false);
  }

  /// Pause the first replay of the item labelled `label` until released.
  pub fn pause_at(&self, label: &str) -> Gate {
    let gate = Gate::default();
    *self.pause.lock().unwrap() = Some((label.to_string(), gate.clone()));
    gate
  }

  /// Number of `fetch_collection` calls, failed ones included.
  pub fn fetch_count(&self) -> usize {
    self.fetches.load(Ordering::SeqCst)
  }

  pub fn applied(&self) -> Vec<QueueItem> {
    self.applied.lock().unwrap().clone()
  }

  pub fn applied_labels(&self) -> Vec<String> {
    self
      .applied()
      .iter()
      .map(|i| label_of(&i.payload).unwrap_or_default())
      .collect()
  }
}

fn label_of(payload: &Value) -> Option<String> {
  payload.get("label").and_then(Value::as_str).map(String::from)
}

#[async_trait]
impl RemoteBackend for FakeRemote {
  async fn fetch_collection(&self, collection: &str) -> Result<Vec<Value>> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(eyre!("network unreachable"));
    }
    Ok(
      self
        .collections
        .lock()
        .unwrap()
        .get(collection)
        .cloned()
        .unwrap_or_default(),
    )
  }

  async fn apply(&self, item: &QueueItem) -> Result<Value> {
    let label = label_of(&item.payload);

    let gate = {
      let mut pause = self.pause.lock().unwrap();
      let hit = matches!((&*pause, &label), (Some((paused, _)), Some(label)) if paused == label);
      if hit {
        pause.take().map(|(_, g)| g)
      } else {
        None
      }
    };
    if let Some(gate) = gate {
      gate.reached.notify_one();
      gate.release.notified().await;
    }

    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(eyre!("network unreachable"));
    }
    if let Some(label) = &label {
      if self.failing_labels.lock().unwrap().contains(label) {
        return Err(eyre!("backend rejected {}", label));
      }
    }

    let mut stored = item.payload.clone();
    if let Value::Object(map) = &mut stored {
      let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
      map.insert("id".to_string(), Value::String(format!("srv-{}", id)));
    }

    self
      .collections
      .lock()
      .unwrap()
      .entry(item.kind.collection().to_string())
      .or_default()
      .push(stored.clone());
    self.applied.lock().unwrap().push(item.clone());
    Ok(stored)
  }
}

pub fn core(remote: Arc<FakeRemote>, connectivity: Arc<ManualConnectivity>) -> SyncCore {
  core_with_store(remote, connectivity).0
}

pub fn core_with_store(
  remote: Arc<FakeRemote>,
  connectivity: Arc<ManualConnectivity>,
) -> (SyncCore, Arc<MemoryStore>) {
  let store = Arc::new(MemoryStore::new());
  let core = SyncCore::new(store.clone(), remote, connectivity);
  (core, store)
}

/// Wait until a status with `pending` items is published.
pub async fn wait_for_pending(rx: &mut broadcast::Receiver<SyncStatus>, pending: usize) {
  let wait = async {
    loop {
      match rx.recv().await {
        Ok(status) if status.pending == pending => return,
        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
        Err(broadcast::error::RecvError::Closed) => panic!("status channel closed"),
      }
    }
  };
  tokio::time::timeout(Duration::from_secs(5), wait)
    .await
    .expect("timed out waiting for pending count");
}
