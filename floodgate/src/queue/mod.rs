//! Bounded queue primitives for producer/consumer pipelines.
//!
//! This module provides the queueing primitives used to move high-volume item streams
//! between pipeline stages without unbounded memory growth, and to stop those streams
//! cleanly. All of them bound their buffers at construction time and support many
//! concurrent producers.
//!
//! # Shutdown semantics
//!
//! Every queue distinguishes two ways of stopping:
//!
//! 1. **Graceful completion**: producers are cut off but buffered items still reach
//!    consumers ([`CompletableQueue::complete`], [`BatchingBoundedQueue::shutdown`]'s
//!    final drain).
//! 2. **Hard termination**: buffered items are discarded and every waiting caller is
//!    released with a terminated error ([`CompletableQueue::terminate`]).
//!
//! # Ordering
//!
//! [`CompletableQueue`] and [`BatchingBoundedQueue`] guarantee global FIFO order across
//! all producers combined; batch boundaries are a delivery-efficiency detail and carry
//! no semantic grouping. [`WorkQueue`] makes no ordering promise between tasks, only the
//! concurrency bound.

pub mod batching;
pub mod completable;
pub mod work;

mod ring;

pub use batching::{BatchConsumer, BatchingBoundedQueue};
pub use completable::CompletableQueue;
pub use ring::nearest_power_of_two;
pub use work::WorkQueue;
