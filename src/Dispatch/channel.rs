//! Per-channel queue pair and the message type that flows through it.
//!
//! With `n` channels the scheduler registry holds `2n` targets:
//! ids `0..n` are the downstream queues (balancer to worker) and ids `n..2n`
//! the upstream queues (worker acknowledgements back to the balancer).

use std::sync::Arc;

use super::command::ChannelId;
use crate::Core::config::QueueKind;
use crate::Core::error::DispatchResult;
use crate::Queue::{GuardedQueue, RingQueue, SharedQueue};

/// What travels through a channel queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope<T> {
    /// A published item, downstream only.
    Item(T),
    /// `k` items processed, upstream only.
    Ack(u64),
}

impl<T> Envelope<T> {
    pub fn into_item(self) -> Option<T> {
        match self {
            Envelope::Item(item) => Some(item),
            Envelope::Ack(_) => None,
        }
    }
}

/// Build one channel queue of the configured kind.
pub fn new_queue<T>(kind: QueueKind, capacity: usize) -> DispatchResult<SharedQueue<T>>
where
    T: Send + 'static,
{
    Ok(match kind {
        QueueKind::LockFree => Arc::new(RingQueue::new(capacity)?),
        QueueKind::Guarded => Arc::new(GuardedQueue::new(capacity)?),
    })
}

/// The two queues owned by channel `i`.
pub struct Channel<T> {
    pub index: ChannelId,
    pub downstream: SharedQueue<Envelope<T>>,
    pub upstream: SharedQueue<Envelope<T>>,
}

impl<T: Send + 'static> Channel<T> {
    pub fn new(index: ChannelId, kind: QueueKind, capacity: usize) -> DispatchResult<Self> {
        Ok(Self {
            index,
            downstream: new_queue(kind, capacity)?,
            upstream: new_queue(kind, capacity)?,
        })
    }
}

impl<T> Channel<T> {
    /// Registry id of the downstream queue.
    pub fn downstream_id(&self) -> ChannelId {
        self.index
    }

    /// Registry id of the upstream queue for a dispatcher with `count` channels.
    pub fn upstream_id(&self, count: usize) -> ChannelId {
        upstream_id(self.index, count)
    }
}

pub fn upstream_id(channel: ChannelId, count: usize) -> ChannelId {
    count + channel
}
