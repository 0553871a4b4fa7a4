//! Durable outbound queue
//!
//! Node-side, bounded and order-preserving. Every mutation is followed by
//! [`DurableQueue::persist`] so a restart loses at most the payload that was
//! in flight.

pub mod durable;
pub mod error;
pub mod store;

pub use durable::{DurableQueue, DEFAULT_QUEUE_CAPACITY};
pub use error::{QueueError, QueueResult};
pub use store::{FileQueueStore, MemoryQueueStore, QueueStore};
