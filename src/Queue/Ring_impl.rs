use std::cell::UnsafeCell;
use std::hint::spin_loop;
use std::mem::MaybeUninit;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use crossbeam_utils::CachePadded;

use super::Ring::{filled_stamp, free_stamp, RingQueue, Slot, PINNED};
use super::BoundedQueue;
use crate::Core::error::{DispatchError, DispatchResult};

/// Clears a slot pin even if `T::clone` unwinds.
struct PinGuard<'a> {
    sequence: &'a AtomicU64,
    restore: u64,
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        self.sequence.store(self.restore, Release);
    }
}

impl<T> RingQueue<T> {
    /// Create an empty ring with `capacity` slots.
    pub fn new(capacity: usize) -> DispatchResult<Self> {
        if capacity == 0 {
            return Err(DispatchError::ZeroCapacity);
        }

        // Slot k starts out free for position k.
        let slots = (0..capacity)
            .map(|k| Slot {
                sequence: AtomicU64::new(free_stamp(k as u64)),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Ok(Self {
            slots,
            capacity,
            tail: CachePadded::new(AtomicU64::new(0)),
            head: CachePadded::new(AtomicU64::new(0)),
        })
    }

    #[inline]
    fn slot(&self, position: u64) -> &Slot<T> {
        &self.slots[(position % self.capacity as u64) as usize]
    }

    /// Snapshot of the `(w, r)` cursors. `r` is loaded first so `w >= r` holds.
    pub fn cursors(&self) -> (u64, u64) {
        let r = self.head.load(Acquire);
        let w = self.tail.load(Acquire);
        (w, r)
    }
}

impl<T> BoundedQueue<T> for RingQueue<T> {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn enqueue(&self, item: T) -> Result<(), T> {
        loop {
            let tail = self.tail.load(Relaxed);
            let slot = self.slot(tail);
            let seq = slot.sequence.load(Acquire) & !PINNED;
            let dif = seq as i64 - free_stamp(tail) as i64;

            if dif == 0 {
                if self
                    .tail
                    .compare_exchange_weak(tail, tail + 1, AcqRel, Relaxed)
                    .is_ok()
                {
                    // We own this slot now
                    unsafe {
                        (*slot.value.get()).write(item);
                    }
                    slot.sequence.store(filled_stamp(tail), Release);
                    return Ok(());
                }
            } else if dif < 0 {
                // full
                return Err(item);
            } else {
                // stale tail; another producer already moved past it
                spin_loop();
            }
        }
    }

    fn dequeue(&self) -> Option<T> {
        loop {
            let head = self.head.load(Relaxed);
            let slot = self.slot(head);
            let seq = slot.sequence.load(Acquire) & !PINNED;
            let dif = seq as i64 - filled_stamp(head) as i64;

            if dif == 0 {
                if self
                    .head
                    .compare_exchange_weak(head, head + 1, AcqRel, Relaxed)
                    .is_ok()
                {
                    // Wait out a concurrent peek, then keep it out while moving the value.
                    while slot
                        .sequence
                        .compare_exchange_weak(
                            filled_stamp(head),
                            filled_stamp(head) | PINNED,
                            Acquire,
                            Relaxed,
                        )
                        .is_err()
                    {
                        spin_loop();
                    }

                    let item = unsafe { (*slot.value.get()).assume_init_read() };

                    // free slot for future producers
                    slot.sequence
                        .store(free_stamp(head + self.capacity as u64), Release);
                    return Some(item);
                }
            } else if dif < 0 {
                // empty
                return None;
            } else {
                // producer not finished or head is stale; retry
                spin_loop();
            }
        }
    }

    fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        loop {
            let head = self.head.load(Acquire);
            let slot = self.slot(head);
            let seq = slot.sequence.load(Acquire);

            if seq & PINNED != 0 {
                spin_loop();
                continue;
            }

            let dif = seq as i64 - filled_stamp(head) as i64;
            if dif < 0 {
                return None;
            }
            if dif > 0 {
                spin_loop();
                continue;
            }

            if slot
                .sequence
                .compare_exchange_weak(seq, seq | PINNED, Acquire, Relaxed)
                .is_err()
            {
                continue;
            }

            let _pin = PinGuard {
                sequence: &slot.sequence,
                restore: seq,
            };
            return Some(unsafe { (*slot.value.get()).assume_init_ref().clone() });
        }
    }

    fn len(&self) -> usize {
        let (w, r) = self.cursors();
        (w.saturating_sub(r) as usize).min(self.capacity)
    }
}

impl<T> Drop for RingQueue<T> {
    fn drop(&mut self) {
        while self.dequeue().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            RingQueue::<u32>::new(0),
            Err(DispatchError::ZeroCapacity)
        ));
    }

    #[test]
    fn wraps_around_non_power_of_two_capacity() {
        let q = RingQueue::new(3).unwrap();
        for lap in 0..5u32 {
            for i in 0..3 {
                assert!(q.enqueue(lap * 10 + i).is_ok());
            }
            assert_eq!(q.enqueue(99), Err(99));
            for i in 0..3 {
                assert_eq!(q.dequeue(), Some(lap * 10 + i));
            }
            assert_eq!(q.dequeue(), None);
        }
        assert_eq!(q.cursors(), (15, 15));
    }

    #[test]
    fn single_slot_ring_refuses_a_second_item() {
        let q = RingQueue::new(1).unwrap();
        for round in 0..4u32 {
            assert_eq!(q.dequeue(), None);
            assert!(q.enqueue(round).is_ok());
            assert_eq!(q.enqueue(99), Err(99));
            assert_eq!(q.cursors(), (round as u64 + 1, round as u64));
            assert_eq!(q.peek(), Some(round));
            assert_eq!(q.dequeue(), Some(round));
        }
        q.enqueue(7).unwrap();
        // drop must not spin on a full single-slot ring
        drop(q);
    }

    #[test]
    fn peek_leaves_the_front_in_place() {
        let q = RingQueue::new(2).unwrap();
        assert_eq!(q.peek(), None::<String>);
        q.enqueue("a".to_string()).unwrap();
        q.enqueue("b".to_string()).unwrap();
        assert_eq!(q.peek().as_deref(), Some("a"));
        assert_eq!(q.len(), 2);
        assert_eq!(q.dequeue().as_deref(), Some("a"));
        assert_eq!(q.peek().as_deref(), Some("b"));
    }

    #[test]
    fn drop_releases_remaining_items() {
        use std::sync::Arc;

        let marker = Arc::new(());
        let q = RingQueue::new(4).unwrap();
        q.enqueue(marker.clone()).unwrap();
        q.enqueue(marker.clone()).unwrap();
        assert_eq!(Arc::strong_count(&marker), 3);
        drop(q);
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
