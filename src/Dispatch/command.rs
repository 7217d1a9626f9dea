//! A unit of pending work against one scheduler target.

use crate::Queue::BoundedQueue;

/// Scheduler target index. See [`Channel`](super::channel::Channel) for the layout.
pub type ChannelId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Unscheduled,
    Scheduled,
    Executed,
}

/// What applying a command did to its target.
#[derive(Debug, PartialEq, Eq)]
pub enum Applied<M> {
    /// The payload now sits in the target queue.
    Written,
    /// The target was full; the command still holds its payload.
    Rejected,
    /// Front of the target, `None` if it was empty.
    Read(Option<M>),
}

/// One pending read or write.
///
/// A write owns its payload until the target accepts it; a read receives the
/// target's front item. Either way exactly one party ends up owning the value.
#[derive(Debug)]
pub struct Command<M> {
    status: CommandStatus,
    channel: ChannelId,
    kind: CommandKind,
    payload: Option<M>,
}

impl<M> Command<M> {
    pub fn write(channel: ChannelId, payload: M) -> Self {
        Self {
            status: CommandStatus::Unscheduled,
            channel,
            kind: CommandKind::Write,
            payload: Some(payload),
        }
    }

    pub fn read(channel: ChannelId) -> Self {
        Self {
            status: CommandStatus::Unscheduled,
            channel,
            kind: CommandKind::Read,
            payload: None,
        }
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Marks the command as recorded in a scheduler queue.
    pub fn schedule(&mut self) {
        self.status = CommandStatus::Scheduled;
    }

    /// Classify the command without touching any queue.
    pub fn probe(&self) -> CommandKind {
        self.kind
    }

    /// Give the payload back to the caller, e.g. when the command could not be saved.
    pub fn into_payload(self) -> Option<M> {
        self.payload
    }

    /// Perform the I/O against `target`.
    ///
    /// Callers hold the scheduler token, which makes the probe-then-apply pair atomic.
    pub fn apply<Q>(&mut self, target: &Q) -> Applied<M>
    where
        Q: BoundedQueue<M> + ?Sized,
    {
        match self.kind {
            CommandKind::Read => {
                self.status = CommandStatus::Executed;
                Applied::Read(target.dequeue())
            }
            CommandKind::Write => {
                let Some(payload) = self.payload.take() else {
                    self.status = CommandStatus::Executed;
                    return Applied::Written;
                };
                match target.enqueue(payload) {
                    Ok(()) => {
                        self.status = CommandStatus::Executed;
                        Applied::Written
                    }
                    Err(payload) => {
                        self.payload = Some(payload);
                        Applied::Rejected
                    }
                }
            }
        }
    }
}
