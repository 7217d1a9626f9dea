use crate::Core::error::{DispatchError, DispatchResult};

/// Which bounded queue variant backs the channel queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueKind {
    /// [`RingQueue`](crate::Queue::RingQueue), atomic cursors.
    #[default]
    LockFree,
    /// [`GuardedQueue`](crate::Queue::GuardedQueue), one mutex per queue.
    Guarded,
}

/// What a polling loop does on a tick that made no progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdleStrategy {
    /// Spin hint only; the loop re-invokes immediately.
    #[default]
    BusyPoll,
    /// Bounded exponential backoff (spin, then yield) until the next productive tick.
    Backoff,
}

/// Construction parameters for a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub channels: usize,
    /// Slots in every downstream and upstream channel queue.
    pub capacity: usize,
    /// Fairness window `mcop`: every `quota_window`-th execute step yields.
    pub quota_window: usize,
    /// Slots in each caller-private retry backlog.
    pub backlog_capacity: usize,
    pub queue_kind: QueueKind,
    pub idle: IdleStrategy,
}

impl DispatcherConfig {
    pub fn new(channels: usize, capacity: usize) -> Self {
        Self {
            channels,
            capacity,
            quota_window: Self::default_quota_window(capacity),
            backlog_capacity: channels.saturating_mul(capacity),
            queue_kind: QueueKind::default(),
            idle: IdleStrategy::default(),
        }
    }

    /// A tenth of the job capacity split across both directions, never below 2.
    pub fn default_quota_window(capacity: usize) -> usize {
        (capacity / 20).max(2)
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.channels == 0 {
            return Err(DispatchError::NoChannels);
        }
        if self.capacity == 0 || self.backlog_capacity == 0 {
            return Err(DispatchError::ZeroCapacity);
        }
        if self.quota_window < 2 {
            return Err(DispatchError::QuotaWindow(self.quota_window));
        }
        Ok(())
    }
}
