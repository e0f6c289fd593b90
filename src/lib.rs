//! Offline-first synchronization core.
//!
//! Reads and writes keep working without a network: reads fall back to the last
//! full snapshot of each collection, writes are queued in a durable outbox and
//! replayed in order once the backend is reachable again. Delivery is
//! at-least-once.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod facade;
pub mod logging;
pub mod models;
pub mod outbox;
pub mod remote;
pub mod service;
pub mod status;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod testing;

pub use facade::{DataAccess, ReadResult, ReadSource, WriteOutcome};
pub use service::SyncCore;
