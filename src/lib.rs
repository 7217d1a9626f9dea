//! In-process event dispatcher.
//!
//! Producers [`publish`](Dispatch::Dispatcher::publish) items; a least-loaded
//! balancer routes each one to a channel whose subscriber processes it on its
//! own thread. All cross-thread traffic goes through bounded queues driven by a
//! non-blocking, two-phase token scheduler.

// Module naming follows project convention (capitalised top-level modules)
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Queue;
#[allow(non_snake_case)]
pub mod Dispatch;
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub use Core::{DispatchError, DispatchResult, DispatcherConfig, IdleStrategy, PublishError, QueueKind};
pub use Dispatch::{ChannelId, Dispatcher, DispatcherBuilder, Envelope};
pub use Queue::{BoundedQueue, GuardedQueue, RingQueue, SharedQueue};
