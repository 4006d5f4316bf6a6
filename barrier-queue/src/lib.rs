//! Multi-producer, single-consumer queue with a bucket barrier.
//!
//! Producers push items and, whenever they finish a bucket of work, check in with
//! [`BarrierQueue::mark_producer_done`] and block in
//! [`BarrierQueue::wait_for_barrier_reset`]. The consumer drains the queue through its
//! [`BarrierConsumer`] and resets the barrier once every active producer has checked
//! in, which keeps all producers within one bucket of each other.

mod consumer;
mod queue;

pub use consumer::BarrierConsumer;
pub use queue::{BarrierQueue, BarrierWait, CheckIn, DEFAULT_POLL_INTERVAL};
