//! Dispatcher error types.
//!
//! Only setup and configuration mistakes are errors. Token contention, fairness
//! yields and full queues are ordinary values returned by the protocol.

use thiserror::Error;

/// Errors raised while building or driving a dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,

    #[error("a dispatcher needs at least one channel")]
    NoChannels,

    #[error("quota window must be at least 2, got {0}")]
    QuotaWindow(usize),

    #[error("channel {channel} is out of range ({count} registered)")]
    UnknownChannel { channel: usize, count: usize },

    #[error("scheduler target registry is full ({0} targets)")]
    RegistryFull(usize),

    #[error("channel {0} already has a subscriber")]
    AlreadySubscribed(usize),

    #[error("dispatcher is shut down")]
    ShutDown,

    #[error("retry backlog is full ({0} entries)")]
    BacklogFull(usize),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// A publish that was not accepted. The item is handed back untouched.
#[derive(Debug, Error)]
pub enum PublishError<T> {
    #[error("dispatcher is shut down")]
    ShutDown(T),

    #[error("publish backlog is full")]
    Backlogged(T),
}

impl<T> PublishError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PublishError::ShutDown(item) | PublishError::Backlogged(item) => item,
        }
    }
}
