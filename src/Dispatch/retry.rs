//! Caller-side retry protocol.
//!
//! Every scheduler call ends in one of the [`Failure`] codes. Non-terminal codes
//! are parked in the caller's private [`Backlog`] and re-issued on the caller's
//! next tick; terminal codes are handed back as [`Settled`] so the caller can
//! run its own bookkeeping.
//!
//! | outcome                    | backlog entry                  |
//! |----------------------------|--------------------------------|
//! | `Save`                     | retry with `Phase::Save`       |
//! | `Execute` / `EarlyRelease` | retry with `Phase::Execute`    |
//! | `NoDefect`                 | none, `Settled::NoDefect`      |
//! | `Successful`               | none, `Settled::Completed`     |

use tracing::{debug, warn};

use super::command::{ChannelId, CommandKind};
use super::scheduler::{Failure, Outcome, Phase, Scheduler, WriteStep};
use crate::Core::error::{DispatchError, DispatchResult};
use crate::Queue::{BoundedQueue, GuardedQueue};

/// A deferred scheduler call.
#[derive(Debug)]
pub struct Retry<M> {
    pub phase: Phase,
    pub channel: ChannelId,
    /// Only set for a write that still has to be saved.
    pub payload: Option<M>,
}

/// Terminal outcome of a call, after any number of retries.
#[derive(Debug, PartialEq, Eq)]
pub enum Settled<M> {
    /// A command was applied. For reads, `item` is what the target held.
    NoDefect { channel: ChannelId, item: Option<M> },
    /// Nothing was left pending.
    Completed { channel: ChannelId },
}

impl<M> Settled<M> {
    pub fn channel(&self) -> ChannelId {
        match self {
            Settled::NoDefect { channel, .. } | Settled::Completed { channel } => *channel,
        }
    }
}

/// A write the backlog could not take on. `payload` is `None` when the scheduler
/// already holds the write and only the retry entry was refused.
#[derive(Debug)]
pub struct Unsubmitted<M> {
    pub error: DispatchError,
    pub payload: Option<M>,
}

/// A caller-private queue of scheduler calls awaiting retry, one per direction.
pub struct Backlog<M> {
    queue: GuardedQueue<Retry<M>>,
    direction: CommandKind,
}

impl<M> Backlog<M> {
    pub fn new(direction: CommandKind, capacity: usize) -> DispatchResult<Self> {
        Ok(Self {
            queue: GuardedQueue::new(capacity)?,
            direction,
        })
    }

    pub fn direction(&self) -> CommandKind {
        self.direction
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Room for one more call.
    pub fn has_room(&self) -> bool {
        !self.queue.is_full()
    }

    /// Save a write and settle the outcome. A payload that never reached the
    /// scheduler, or could not be parked, comes back in the error.
    pub fn submit_write(
        &self,
        scheduler: &Scheduler<M>,
        channel: ChannelId,
        payload: M,
    ) -> Result<Option<Settled<M>>, Unsubmitted<M>> {
        debug_assert_eq!(self.direction, CommandKind::Write);
        if !self.has_room() {
            return Err(Unsubmitted {
                error: DispatchError::BacklogFull(self.capacity()),
                payload: Some(payload),
            });
        }
        if let Err(error) = scheduler.target(channel) {
            return Err(Unsubmitted {
                error,
                payload: Some(payload),
            });
        }

        let outcome = scheduler.enqueue_checked(channel, WriteStep::Save(payload));
        self.park(channel, outcome).map_err(|retry| Unsubmitted {
            error: DispatchError::BacklogFull(self.capacity()),
            payload: retry.payload,
        })
    }

    /// Save a read and settle the outcome.
    pub fn submit_read(
        &self,
        scheduler: &Scheduler<M>,
        channel: ChannelId,
    ) -> DispatchResult<Option<Settled<M>>> {
        debug_assert_eq!(self.direction, CommandKind::Read);
        let outcome = scheduler.dequeue(channel, Phase::Save)?;
        self.settle(channel, outcome)
    }

    /// Park a non-terminal outcome, or return the terminal one.
    pub fn settle(
        &self,
        channel: ChannelId,
        outcome: Outcome<M>,
    ) -> DispatchResult<Option<Settled<M>>> {
        self.park(channel, outcome)
            .map_err(|_| DispatchError::BacklogFull(self.capacity()))
    }

    /// Drop every parked call whose channel `discard` selects. Returns how many.
    pub fn discard<F>(&mut self, mut discard: F) -> usize
    where
        F: FnMut(ChannelId) -> bool,
    {
        self.queue.retain(|entry| !discard(entry.channel))
    }

    /// `Err` hands back the entry the full backlog refused.
    fn park(&self, channel: ChannelId, outcome: Outcome<M>) -> Result<Option<Settled<M>>, Retry<M>> {
        let Outcome { failure, item } = outcome;

        let retry = match failure {
            Failure::NoDefect => return Ok(Some(Settled::NoDefect { channel, item })),
            Failure::Successful => return Ok(Some(Settled::Completed { channel })),
            Failure::Save => Retry {
                phase: Phase::Save,
                channel,
                payload: item,
            },
            Failure::Execute | Failure::EarlyRelease => Retry {
                phase: Phase::Execute,
                channel,
                payload: None,
            },
        };

        debug!(
            channel,
            ?failure,
            direction = ?self.direction,
            backlog = self.queue.len(),
            "requeue for retry"
        );
        if let Err(retry) = self.queue.enqueue(retry) {
            warn!(channel, capacity = self.capacity(), "could not enqueue into local backlog");
            return Err(retry);
        }
        Ok(None)
    }

    /// Re-issue every call that was parked when this pass started, once.
    /// Returns how many reached a terminal outcome.
    pub fn retry<F>(&self, scheduler: &Scheduler<M>, mut on_settled: F) -> DispatchResult<usize>
    where
        F: FnMut(Settled<M>),
    {
        let mut settled = 0;
        for _ in 0..self.queue.len() {
            let Some(entry) = self.queue.dequeue() else {
                break;
            };

            let outcome = match (self.direction, entry.phase, entry.payload) {
                (CommandKind::Write, Phase::Save, Some(payload)) => {
                    scheduler.enqueue(entry.channel, WriteStep::Save(payload))?
                }
                (CommandKind::Write, _, _) => scheduler.enqueue(entry.channel, WriteStep::Execute)?,
                (CommandKind::Read, phase, _) => scheduler.dequeue(entry.channel, phase)?,
            };

            if let Some(done) = self.settle(entry.channel, outcome)? {
                settled += 1;
                on_settled(done);
            }
        }
        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Queue::RingQueue;
    use std::sync::Arc;

    fn scheduler(quota: usize) -> Scheduler<u32> {
        let mut s = Scheduler::new(2, 8, quota).unwrap();
        s.add_target(Arc::new(RingQueue::new(4).unwrap())).unwrap();
        s.add_target(Arc::new(RingQueue::new(4).unwrap())).unwrap();
        s
    }

    #[test]
    fn terminal_outcomes_are_returned() {
        let s = scheduler(64);
        let writes = Backlog::new(CommandKind::Write, 4).unwrap();
        let reads = Backlog::new(CommandKind::Read, 4).unwrap();

        assert_eq!(
            writes.submit_write(&s, 1, 9).unwrap(),
            Some(Settled::NoDefect {
                channel: 1,
                item: None
            })
        );
        assert_eq!(
            reads.submit_read(&s, 1).unwrap(),
            Some(Settled::NoDefect {
                channel: 1,
                item: Some(9)
            })
        );
        assert!(writes.is_empty() && reads.is_empty());
    }

    #[test]
    fn early_release_is_retried_with_execute() {
        let s = scheduler(2);
        let writes = Backlog::new(CommandKind::Write, 4).unwrap();

        assert!(writes.submit_write(&s, 0, 1).unwrap().is_some());
        assert_eq!(writes.submit_write(&s, 0, 2).unwrap(), None);
        assert_eq!(writes.len(), 1);

        let mut seen = Vec::new();
        assert_eq!(writes.retry(&s, |done| seen.push(done)).unwrap(), 1);
        assert_eq!(
            seen,
            vec![Settled::NoDefect {
                channel: 0,
                item: None
            }]
        );
        assert!(writes.is_empty());
        assert_eq!(s.target(0).unwrap().len(), 2);
    }

    #[test]
    fn contended_save_keeps_the_payload() {
        let s = scheduler(64);
        let writes = Backlog::new(CommandKind::Write, 4).unwrap();

        let outcome = Outcome {
            failure: Failure::Save,
            item: Some(5),
        };
        assert_eq!(writes.settle(1, outcome).unwrap(), None);

        let mut seen = Vec::new();
        writes.retry(&s, |done| seen.push(done.channel())).unwrap();
        assert_eq!(seen, vec![1]);
        assert_eq!(s.target(1).unwrap().dequeue(), Some(5));
    }

    #[test]
    fn refused_write_keeps_its_payload() {
        let s = scheduler(64);
        let mut writes = Backlog::new(CommandKind::Write, 1).unwrap();

        let unknown = writes.submit_write(&s, 5, 1).unwrap_err();
        assert!(matches!(unknown.error, DispatchError::UnknownChannel { channel: 5, .. }));
        assert_eq!(unknown.payload, Some(1));

        let busy = Outcome {
            failure: Failure::Execute,
            item: None,
        };
        assert_eq!(writes.settle(1, busy).unwrap(), None);
        let full = writes.submit_write(&s, 1, 2).unwrap_err();
        assert!(matches!(full.error, DispatchError::BacklogFull(1)));
        assert_eq!(full.payload, Some(2));
        assert!(s.target(1).unwrap().is_empty());

        assert_eq!(writes.discard(|channel| channel == 1), 1);
        assert!(writes.is_empty());
    }

    #[test]
    fn full_backlog_is_reported() {
        let writes = Backlog::<u32>::new(CommandKind::Write, 1).unwrap();
        let busy = || Outcome {
            failure: Failure::Execute,
            item: None,
        };

        assert!(writes.has_room());
        assert_eq!(writes.settle(0, busy()).unwrap(), None);
        assert!(!writes.has_room());
        assert!(matches!(
            writes.settle(0, busy()),
            Err(DispatchError::BacklogFull(1))
        ));
    }
}
