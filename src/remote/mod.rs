//! Boundary to the hosted backend.
//!
//! The sync core consumes the backend through [`RemoteBackend`]: one full read
//! per collection and one endpoint per [`MutationKind`]. Replays carry the queue
//! item id so a backend that deduplicates can recognize retries.
//!
//! [`MutationKind`]: crate::outbox::MutationKind

mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;

use crate::outbox::QueueItem;

#[async_trait]
pub trait RemoteBackend: Send + Sync {
  /// Fetch the full current contents of `collection`.
  async fn fetch_collection(&self, collection: &str) -> Result<Vec<Value>>;

  /// Apply a mutation and return the record as stored by the backend.
  async fn apply(&self, item: &QueueItem) -> Result<Value>;
}

/// Backend used when no URL is configured: every call fails, so reads serve
/// the cache and writes stay queued.
pub struct Unconfigured;

#[async_trait]
impl RemoteBackend for Unconfigured {
  async fn fetch_collection(&self, collection: &str) -> Result<Vec<Value>> {
    Err(eyre!("Cannot fetch {}: backend.url is not configured", collection))
  }

  async fn apply(&self, item: &QueueItem) -> Result<Value> {
    Err(eyre!("Cannot {}: backend.url is not configured", item.kind))
  }
}
