//! Read-through cache of the last successful full fetch, per collection.
//!
//! This module provides the read fallback for the sync core:
//! - Stores each collection as a wholesale snapshot (replace-all, never merged)
//! - Serves the snapshot when the network read fails
//! - Accepts optimistic records appended by offline writes
//! - Reports cache misses, confirmed-empty collections and storage failures distinctly

mod layer;
mod traits;

pub use layer::LocalCache;
pub use traits::CacheLookup;
