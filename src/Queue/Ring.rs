// Lock-free bounded ring shared by every producer and consumer of a channel.

use crossbeam_utils::CachePadded;

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::AtomicU64;

/// Set on a slot's sequence while one thread has exclusive access to its value
/// (a `peek` cloning it, or the consumer that won the slot moving it out).
pub(crate) const PINNED: u64 = 1 << 63;

/// Stamp of a slot that is free for a write at `position`.
#[inline]
pub(crate) const fn free_stamp(position: u64) -> u64 {
    position << 1
}

/// Stamp of a slot holding the value written at `position`.
#[inline]
pub(crate) const fn filled_stamp(position: u64) -> u64 {
    (position << 1) | 1
}

/// A single slot in the ring buffer.
pub(crate) struct Slot<T> {
    /// The sequence number of the slot. This is the core of the synchronization.
    /// Stamps are doubled so "free for `p + 1`" and "filled at `p`" never collide,
    /// not even with a single slot.
    /// - A producer claims a `tail` position and writes once `sequence == 2 * tail`.
    ///   After writing, it sets `sequence` to `2 * tail + 1`, signaling completion.
    /// - A consumer takes its `head` position once `sequence == 2 * head + 1` and
    ///   releases the slot for the next lap by storing `2 * (head + capacity)`.
    pub(crate) sequence: AtomicU64,

    /// Payload, initialized only while `sequence` is the filled stamp of its position.
    pub(crate) value: UnsafeCell<MaybeUninit<T>>,
}

/// A lock-free, multi-producer, multi-consumer bounded FIFO.
///
/// ### Concurrency Design:
/// - **Producers (Enqueue)**: claim a position by advancing `tail` with a CAS, but
///   only after the target slot reports it is free. A full ring is detected
///   before the cursor moves, so no slot is ever lost to a failed claim.
/// - **Consumers (Dequeue)**: claim a position by advancing `head` the same way
///   once the slot reports a completed write.
/// - **Peek**: pins the front slot, clones the value, and unpins it. A consumer
///   that won the slot waits for the pin to clear before moving the value out.
pub struct RingQueue<T> {
    pub(crate) slots: Box<[Slot<T>]>,

    /// The capacity of the ring (number of slots).
    pub(crate) capacity: usize,

    /// The write cursor `w`. Padded to prevent false sharing with `head`.
    pub(crate) tail: CachePadded<AtomicU64>,

    /// The read cursor `r`.
    pub(crate) head: CachePadded<AtomicU64>,
}

unsafe impl<T: Send> Send for RingQueue<T> {}
unsafe impl<T: Send> Sync for RingQueue<T> {}
