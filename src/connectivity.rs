//! Online/offline signal and the monitor that turns reconnects into drains.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use crate::sync::SyncProcessor;

/// Source of the platform connectivity signal.
pub trait ConnectivitySource: Send + Sync {
  /// Current state.
  fn is_online(&self) -> bool;

  /// Stream of states; every change is observable through `changed()`.
  fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity driven by hand: tests, and `--offline` runs.
pub struct ManualConnectivity {
  tx: watch::Sender<bool>,
}

impl ManualConnectivity {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx }
  }

  pub fn set_online(&self, online: bool) {
    self.tx.send_if_modified(|current| {
      let changed = *current != online;
      *current = online;
      changed
    });
  }
}

impl ConnectivitySource for ManualConnectivity {
  fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

/// Connectivity derived from periodically probing the backend.
///
/// A response with a status below 500 counts as reachable.
pub struct ProbeConnectivity {
  tx: Arc<watch::Sender<bool>>,
  task: JoinHandle<()>,
}

impl ProbeConnectivity {
  /// Probe once, then keep probing every `interval` in the background.
  pub async fn start(client: reqwest::Client, url: Url, interval: Duration) -> Self {
    let initial = probe(&client, &url).await;
    info!(online = initial, url = %url, "Initial connectivity probe");
    let (tx, _rx) = watch::channel(initial);
    let tx = Arc::new(tx);

    let probe_tx = Arc::clone(&tx);
    let task = tokio::spawn(async move {
      loop {
        tokio::time::sleep(interval).await;
        let online = probe(&client, &url).await;
        probe_tx.send_if_modified(|current| {
          let changed = *current != online;
          *current = online;
          changed
        });
      }
    });

    Self { tx, task }
  }
}

async fn probe(client: &reqwest::Client, url: &Url) -> bool {
  match client.get(url.clone()).send().await {
    Ok(response) => !response.status().is_server_error(),
    Err(e) => {
      debug!(error = %e, "Connectivity probe failed");
      false
    }
  }
}

impl ConnectivitySource for ProbeConnectivity {
  fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

impl Drop for ProbeConnectivity {
  fn drop(&mut self) {
    self.task.abort();
  }
}

/// Subscribes once to a [`ConnectivitySource`] and starts a drain on every
/// offline-to-online transition.
pub struct ConnectivityMonitor;

impl ConnectivityMonitor {
  pub fn spawn(
    source: Arc<dyn ConnectivitySource>,
    processor: Arc<SyncProcessor>,
  ) -> JoinHandle<()> {
    let mut rx = source.subscribe();
    let mut was_online = *rx.borrow_and_update();

    tokio::spawn(async move {
      while rx.changed().await.is_ok() {
        let online = *rx.borrow_and_update();
        match (was_online, online) {
          (false, true) => {
            info!("Connectivity restored, draining outbox");
            processor.spawn_drain();
          }
          (true, false) => info!("Connectivity lost, writes will be queued"),
          _ => {}
        }
        was_online = online;
      }
      debug!("Connectivity source closed, monitor stopping");
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::outbox::MutationKind;
  use crate::testing::{self, FakeRemote};
  use serde_json::json;

  #[test]
  fn test_manual_connectivity() {
    let conn = ManualConnectivity::new(false);
    let mut rx = conn.subscribe();
    assert!(!conn.is_online());

    conn.set_online(true);
    assert!(conn.is_online());
    assert!(rx.has_changed().unwrap());
    let _ = rx.borrow_and_update();

    // Same value again is not a transition
    conn.set_online(true);
    assert!(!rx.has_changed().unwrap());
  }

  #[tokio::test]
  async fn test_reconnect_triggers_drain() {
    let remote = Arc::new(FakeRemote::new());
    let conn = Arc::new(ManualConnectivity::new(false));
    let core = testing::core(remote.clone(), conn.clone());

    core.enqueue(MutationKind::CreateMeal, json!({"label": "A"})).await.unwrap();
    core.enqueue(MutationKind::CreateMeal, json!({"label": "B"})).await.unwrap();

    let mut status = core.status().subscribe();
    let monitor = ConnectivityMonitor::spawn(conn.clone(), core.processor().clone());

    conn.set_online(true);
    testing::wait_for_pending(&mut status, 0).await;

    assert_eq!(remote.applied_labels(), vec!["A", "B"]);
    assert_eq!(core.queue().size().await, 0);
    monitor.abort();
  }

  #[tokio::test]
  async fn test_going_offline_does_not_drain() {
    let remote = Arc::new(FakeRemote::new());
    let conn = Arc::new(ManualConnectivity::new(true));
    let core = testing::core(remote.clone(), conn.clone());
    let monitor = ConnectivityMonitor::spawn(conn.clone(), core.processor().clone());

    conn.set_online(false);
    core.enqueue(MutationKind::CreateMeal, json!({"label": "A"})).await.unwrap();
    tokio::task::yield_now().await;

    assert!(remote.applied_labels().is_empty());
    assert_eq!(core.queue().size().await, 1);
    monitor.abort();
  }
}
