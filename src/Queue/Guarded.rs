// Mutex-guarded bounded ring. Same check-then-advance logic as the lock-free
// ring, but the whole operation runs inside one critical section, so no
// cursor ever needs rolling back.

use parking_lot::Mutex;

use super::BoundedQueue;
use crate::Core::error::{DispatchError, DispatchResult};

struct Cursors<T> {
    items: Box<[Option<T>]>,
    w: u64,
    r: u64,
}

impl<T> Cursors<T> {
    #[inline]
    fn index(&self, position: u64) -> usize {
        (position % self.items.len() as u64) as usize
    }
}

/// Bounded FIFO behind a `parking_lot::Mutex`.
pub struct GuardedQueue<T> {
    inner: Mutex<Cursors<T>>,
    capacity: usize,
}

impl<T> GuardedQueue<T> {
    pub fn new(capacity: usize) -> DispatchResult<Self> {
        if capacity == 0 {
            return Err(DispatchError::ZeroCapacity);
        }

        let items = (0..capacity).map(|_| None).collect();
        Ok(Self {
            inner: Mutex::new(Cursors { items, w: 0, r: 0 }),
            capacity,
        })
    }

    /// Mutable access to the front item. Exclusive access needs no locking.
    pub fn front_mut(&mut self) -> Option<&mut T> {
        let cursors = self.inner.get_mut();
        if cursors.r == cursors.w {
            return None;
        }
        let idx = cursors.index(cursors.r);
        cursors.items[idx].as_mut()
    }

    /// Move the front item to the back.
    pub fn rotate_front(&mut self) {
        let cursors = self.inner.get_mut();
        if cursors.r == cursors.w {
            return;
        }
        let front = cursors.index(cursors.r);
        let item = cursors.items[front].take();
        cursors.r += 1;
        let back = cursors.index(cursors.w);
        cursors.items[back] = item;
        cursors.w += 1;
    }

    /// Keep the items `keep` accepts, in their current order, and drop the rest.
    /// Returns how many were dropped.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let cursors = self.inner.get_mut();
        let mut dropped = 0;
        for _ in 0..cursors.w - cursors.r {
            let front = cursors.index(cursors.r);
            cursors.r += 1;
            let Some(item) = cursors.items[front].take() else {
                continue;
            };
            if keep(&item) {
                // the slot at `w` is free: at most `capacity - 1` items are left
                let back = cursors.index(cursors.w);
                cursors.items[back] = Some(item);
                cursors.w += 1;
            } else {
                dropped += 1;
            }
        }
        dropped
    }

    /// Snapshot of the `(w, r)` cursors.
    pub fn cursors(&self) -> (u64, u64) {
        let guard = self.inner.lock();
        (guard.w, guard.r)
    }
}

impl<T> BoundedQueue<T> for GuardedQueue<T> {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn enqueue(&self, item: T) -> Result<(), T> {
        let mut guard = self.inner.lock();
        if guard.w - guard.r >= self.capacity as u64 {
            return Err(item);
        }
        let idx = guard.index(guard.w);
        guard.items[idx] = Some(item);
        guard.w += 1;
        Ok(())
    }

    fn dequeue(&self) -> Option<T> {
        let mut guard = self.inner.lock();
        if guard.r == guard.w {
            return None;
        }
        let idx = guard.index(guard.r);
        guard.r += 1;
        guard.items[idx].take()
    }

    fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        let guard = self.inner.lock();
        if guard.r == guard.w {
            return None;
        }
        guard.items[guard.index(guard.r)].clone()
    }

    fn len(&self) -> usize {
        let guard = self.inner.lock();
        (guard.w - guard.r) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn front_mut_edits_in_place() {
        let mut q = GuardedQueue::new(2).unwrap();
        assert!(q.front_mut().is_none());
        q.enqueue(vec![1]).unwrap();
        q.enqueue(vec![2]).unwrap();
        q.front_mut().unwrap().push(10);
        assert_eq!(q.dequeue(), Some(vec![1, 10]));
        assert_eq!(q.front_mut().map(|v| v.len()), Some(1));
    }

    #[test]
    fn rotate_and_retain_keep_the_rest_in_order() {
        let mut q = GuardedQueue::new(4).unwrap();
        for i in 1..=4u8 {
            q.enqueue(i).unwrap();
        }
        q.rotate_front();
        assert_eq!(q.peek(), Some(2));
        assert_eq!(q.len(), 4);

        assert_eq!(q.retain(|v| v % 2 == 0), 2);
        assert_eq!(q.dequeue(), Some(2));
        assert_eq!(q.dequeue(), Some(4));
        assert_eq!(q.dequeue(), None);

        // single slot: the front is also the back
        let mut one = GuardedQueue::new(1).unwrap();
        one.enqueue('a').unwrap();
        one.rotate_front();
        assert_eq!(one.dequeue(), Some('a'));
    }

    #[test]
    fn cursors_track_every_operation() {
        let q = GuardedQueue::new(2).unwrap();
        q.enqueue(1u8).unwrap();
        q.enqueue(2).unwrap();
        assert_eq!(q.enqueue(3), Err(3));
        assert_eq!(q.cursors(), (2, 0));
        q.dequeue();
        assert_eq!(q.dequeue(), Some(2));
        assert_eq!(q.dequeue(), None);
        assert_eq!(q.cursors(), (2, 2));
    }
}
