//! Data access facade: the one path every read and write goes through.
//!
//! Reads are network-first with the local cache as fallback. Writes go straight
//! to the backend when online, and are applied optimistically to the cache and
//! queued when offline.

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::CacheLookup;
use crate::models::{ChatMessage, Meal, Measure, Record, LOCAL_ID_PREFIX};
use crate::outbox::QueueItem;
use crate::service::SyncCore;

/// Where a read result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSource {
  /// Fresh data from the backend
  Network,
  /// Cached snapshot (possibly stale, possibly holding optimistic records)
  Cache,
  /// Cached snapshot of a fetch that returned nothing
  CacheEmpty,
  /// Network failed and the collection was never cached
  CacheMiss,
  /// Network failed and the cache could not be read
  CacheUnavailable,
}

/// Records plus their provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult<T> {
  pub records: Vec<T>,
  pub source: ReadSource,
}

/// Result of a successful write call.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
  /// The backend stored the record; carries the server's version
  Delivered(T),
  /// Applied locally under a temporary id and queued for delivery
  Pending(T),
}

impl<T> WriteOutcome<T> {
  pub fn record(&self) -> &T {
    match self {
      Self::Delivered(record) | Self::Pending(record) => record,
    }
  }

  pub fn into_record(self) -> T {
    match self {
      Self::Delivered(record) | Self::Pending(record) => record,
    }
  }

  pub fn is_pending(&self) -> bool {
    matches!(self, Self::Pending(_))
  }
}

#[derive(Clone)]
pub struct DataAccess {
  core: Arc<SyncCore>,
}

impl DataAccess {
  pub fn new(core: Arc<SyncCore>) -> Self {
    Self { core }
  }

  pub fn core(&self) -> &Arc<SyncCore> {
    &self.core
  }

  /// Read a whole collection.
  ///
  /// When online, fetches from the backend and replaces the cached snapshot.
  /// When offline or when the fetch fails, serves the cached snapshot. Both
  /// paths return records in `Record::sort_key` order.
  pub async fn read<T: Record>(&self) -> ReadResult<T> {
    let collection = T::COLLECTION;

    if self.core.is_online() {
      match self.core.remote().fetch_collection(collection).await {
        Ok(values) => {
          let mut records: Vec<T> = values
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
              Ok(record) => Some(record),
              Err(e) => {
                warn!(collection, error = %e, "Skipping undecodable record from backend");
                None
              }
            })
            .collect();
          self.core.cache().replace_collection(collection, &records);
          sort_records(&mut records);
          return ReadResult {
            records,
            source: ReadSource::Network,
          };
        }
        Err(e) => {
          info!(collection, error = %e, "Fetch failed, serving cache");
        }
      }
    } else {
      debug!(collection, "Offline, serving cache");
    }

    let (mut records, source) = match self.core.cache().lookup_collection::<T>(collection) {
      CacheLookup::Hit(records) => (records, ReadSource::Cache),
      CacheLookup::Empty => (Vec::new(), ReadSource::CacheEmpty),
      CacheLookup::Miss => (Vec::new(), ReadSource::CacheMiss),
      CacheLookup::Unavailable => (Vec::new(), ReadSource::CacheUnavailable),
    };
    sort_records(&mut records);
    ReadResult { records, source }
  }

  /// Create a record.
  ///
  /// Offline: the record gets a `local-` id, is appended to the cache, queued,
  /// and returned as [`WriteOutcome::Pending`] without touching the network.
  /// Online: sent directly. If that fails the same mutation is queued for retry
  /// and the error is still returned, so the caller can show a transient message.
  pub async fn create<T: Record>(&self, record: T) -> Result<WriteOutcome<T>> {
    let payload =
      serde_json::to_value(&record).map_err(|e| eyre!("Failed to serialize record: {}", e))?;
    let item = QueueItem::new(T::CREATE, payload);

    if !self.core.is_online() {
      let mut local = record;
      local.set_id(format!("{}{}", LOCAL_ID_PREFIX, item.id));
      self.core.cache().append_record(T::COLLECTION, &local);
      // A failed enqueue is swallowed; the optimistic record still shows
      self.core.enqueue_item(item).await;
      debug!(id = local.id(), collection = T::COLLECTION, "Stored optimistically");
      return Ok(WriteOutcome::Pending(local));
    }

    match self.core.remote().apply(&item).await {
      Ok(value) => match serde_json::from_value::<T>(value) {
        Ok(stored) => {
          debug!(id = stored.id(), collection = T::COLLECTION, "Delivered");
          Ok(WriteOutcome::Delivered(stored))
        }
        Err(e) => {
          warn!(kind = %item.kind, error = %e, "Unexpected create response, keeping local copy");
          Ok(WriteOutcome::Delivered(record))
        }
      },
      Err(e) => {
        let id = item.id.clone();
        let context = match self.core.enqueue_item(item).await {
          Some(_) => format!("queued as {} for retry", id),
          None => format!("could not queue {} for retry", id),
        };
        Err(e.wrap_err(context))
      }
    }
  }

  pub async fn measures(&self) -> Vec<Measure> {
    self.read::<Measure>().await.records
  }

  pub async fn meals(&self) -> Vec<Meal> {
    self.read::<Meal>().await.records
  }

  pub async fn chat_history(&self) -> Vec<ChatMessage> {
    self.read::<ChatMessage>().await.records
  }

  pub async fn add_measure(&self, measure: Measure) -> Result<WriteOutcome<Measure>> {
    self.create(measure).await
  }

  pub async fn log_meal(&self, meal: Meal) -> Result<WriteOutcome<Meal>> {
    self.create(meal).await
  }

  pub async fn send_message(&self, message: ChatMessage) -> Result<WriteOutcome<ChatMessage>> {
    self.create(message).await
  }
}

fn sort_records<T: Record>(records: &mut [T]) {
  records.sort_by_key(|r| r.sort_key());
}
