//! Durable, ordered outbox of mutation intents not yet confirmed by the backend.

mod item;
mod queue;

pub use item::{MutationKind, QueueItem};
pub use queue::WriteQueue;
