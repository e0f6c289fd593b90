//! Replays the outbox against the backend.

mod processor;

pub use processor::{DrainReport, SyncProcessor};
