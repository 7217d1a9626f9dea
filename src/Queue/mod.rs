//! Fixed-capacity FIFO queues.
//!
//! Two interchangeable implementations share the [`BoundedQueue`] contract:
//!
//! - [`RingQueue`]: lock-free ring with per-slot sequence numbers, safe for any
//!   number of concurrent producers and consumers.
//! - [`GuardedQueue`]: the same ring logic behind a single `parking_lot::Mutex`.
//!   Used for caller-private retry backlogs and the scheduler's command queues.
//!
//! Both keep a monotonic write cursor `w` and read cursor `r` with
//! `0 <= w - r <= capacity` at every observation point.

pub mod Guarded;
pub mod Ring;
pub mod Ring_impl;
mod debug;

use std::sync::Arc;

pub use Guarded::GuardedQueue;
pub use Ring::RingQueue;

/// Contract shared by every bounded queue in the crate. All operations are O(1).
pub trait BoundedQueue<T> {
    /// Number of slots fixed at creation.
    fn capacity(&self) -> usize;

    /// Append `item` at the back. Hands the item back if the queue is full.
    fn enqueue(&self, item: T) -> Result<(), T>;

    /// Remove the front item, `None` if the queue is empty.
    fn dequeue(&self) -> Option<T>;

    /// Clone of the front item without removing it.
    fn peek(&self) -> Option<T>
    where
        T: Clone;

    /// Logical length `w - r`.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }
}

/// A queue shared between the scheduler and the threads that own a channel.
pub type SharedQueue<T> = Arc<dyn BoundedQueue<T> + Send + Sync>;
