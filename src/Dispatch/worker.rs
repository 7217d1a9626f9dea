//! The drain step run by a subscriber's thread.

use tracing::{trace, warn};

use super::channel::{upstream_id, Envelope};
use super::command::{ChannelId, CommandKind};
use super::retry::{Backlog, Settled, Unsubmitted};
use super::scheduler::{Failure, Scheduler, WriteStep};
use crate::Core::error::{DispatchError, DispatchResult};

/// Reads one downstream channel and acknowledges what it processed upstream.
pub struct Worker<T> {
    channel: ChannelId,
    upstream: ChannelId,
    reads: Backlog<Envelope<T>>,
    writes: Backlog<Envelope<T>>,
    /// Processed items whose acknowledgement is not yet with the scheduler.
    unacked: u64,
}

impl<T> Worker<T> {
    pub fn new(channel: ChannelId, channels: usize, backlog_capacity: usize) -> DispatchResult<Self> {
        if channel >= channels {
            return Err(DispatchError::UnknownChannel {
                channel,
                count: channels,
            });
        }
        Ok(Self {
            channel,
            upstream: upstream_id(channel, channels),
            reads: Backlog::new(CommandKind::Read, backlog_capacity)?,
            writes: Backlog::new(CommandKind::Write, backlog_capacity)?,
            unacked: 0,
        })
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Nothing parked in either backlog and every processed item acknowledged.
    pub fn is_idle(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty() && self.unacked == 0
    }

    pub fn unacked(&self) -> u64 {
        self.unacked
    }

    /// One pass of the worker loop. Returns the number of items handed to `handler`.
    pub fn tick<F>(&mut self, scheduler: &Scheduler<Envelope<T>>, handler: &mut F) -> DispatchResult<usize>
    where
        F: FnMut(T),
    {
        self.writes.retry(scheduler, |_| {})?;

        // a write saved by a caller that already settled has no one else to apply it
        if scheduler.enqueue(self.upstream, WriteStep::Execute)?.failure == Failure::NoDefect {
            trace!(channel = self.channel, "worker applied a saved write");
        }

        let channel = self.channel;
        let mut processed = 0;
        let mut deliver = |settled: Settled<Envelope<T>>| {
            let Settled::NoDefect { item: Some(envelope), .. } = settled else {
                return;
            };
            let Envelope::Item(item) = envelope else {
                warn!(channel, "acknowledgement on a downstream queue");
                return;
            };
            handler(item);
            processed += 1;
        };

        self.reads.retry(scheduler, &mut deliver)?;
        if self.reads.is_empty() {
            if let Some(settled) = self.reads.submit_read(scheduler, channel)? {
                deliver(settled);
            }
        }

        self.unacked += processed as u64;
        self.acknowledge(scheduler)?;
        Ok(processed)
    }

    /// Post every outstanding acknowledgement as one `Ack(k)`. What cannot be
    /// posted stays owed for the next tick.
    fn acknowledge(&mut self, scheduler: &Scheduler<Envelope<T>>) -> DispatchResult<()> {
        if self.unacked == 0 {
            return Ok(());
        }
        if !self.writes.has_room() {
            self.writes.retry(scheduler, |_| {})?;
        }

        let owed = self.unacked;
        match self
            .writes
            .submit_write(scheduler, self.upstream, Envelope::Ack(owed))
        {
            Ok(_) => {
                self.unacked = 0;
                Ok(())
            }
            // the scheduler holds the acknowledgement, only its retry entry was refused
            Err(Unsubmitted { payload: None, .. }) => {
                self.unacked = 0;
                Ok(())
            }
            Err(Unsubmitted { error, .. }) => {
                warn!(channel = self.channel, owed, %error, "acknowledgement deferred");
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Core::config::QueueKind;
    use crate::Dispatch::channel::Channel;
    use crate::Queue::BoundedQueue;

    #[test]
    fn processes_and_acknowledges() {
        let mut s = Scheduler::new(2, 16, 64).unwrap();
        let ch = Channel::<u32>::new(0, QueueKind::Guarded, 4).unwrap();
        s.add_target(ch.downstream.clone()).unwrap();
        s.add_target(ch.upstream.clone()).unwrap();

        let mut worker = Worker::new(0, 1, 8).unwrap();
        let mut seen = Vec::new();
        assert_eq!(worker.tick(&s, &mut |v| seen.push(v)).unwrap(), 0);

        ch.downstream.enqueue(Envelope::Item(3)).unwrap();
        ch.downstream.enqueue(Envelope::Item(4)).unwrap();
        assert_eq!(worker.tick(&s, &mut |v| seen.push(v)).unwrap(), 1);
        assert_eq!(worker.tick(&s, &mut |v| seen.push(v)).unwrap(), 1);

        assert_eq!(seen, vec![3, 4]);
        assert_eq!(ch.upstream.dequeue(), Some(Envelope::Ack(1)));
        assert_eq!(ch.upstream.dequeue(), Some(Envelope::Ack(1)));
        assert!(worker.is_idle());
    }

    #[test]
    fn deferred_acknowledgements_are_posted_later() {
        let mut s = Scheduler::new(2, 16, 64).unwrap();
        let ch = Channel::<u32>::new(0, QueueKind::Guarded, 1).unwrap();
        s.add_target(ch.downstream.clone()).unwrap();
        s.add_target(ch.upstream.clone()).unwrap();

        let mut worker = Worker::new(0, 1, 1).unwrap();
        let mut seen = Vec::new();
        // upstream full: the first Ack(1) is saved but cannot be applied
        ch.upstream.enqueue(Envelope::Ack(0)).unwrap();

        for item in 0..2 {
            ch.downstream.enqueue(Envelope::Item(item)).unwrap();
            let _ = worker.tick(&s, &mut |v| seen.push(v));
        }
        assert_eq!(seen, vec![0, 1]);
        // one acknowledgement parked, the other still owed
        assert_eq!(worker.unacked(), 1);
        assert!(!worker.is_idle());

        assert_eq!(ch.upstream.dequeue(), Some(Envelope::Ack(0)));
        let mut acked = 0;
        for _ in 0..8 {
            worker.tick(&s, &mut |v| seen.push(v)).unwrap();
            while let Some(Envelope::Ack(k)) = ch.upstream.dequeue() {
                acked += k;
            }
        }
        assert_eq!(acked, 2);
        assert!(worker.is_idle());
    }

    #[test]
    fn rejects_channels_out_of_range() {
        assert!(matches!(
            Worker::<u8>::new(2, 2, 4),
            Err(DispatchError::UnknownChannel { channel: 2, count: 2 })
        ));
    }
}
