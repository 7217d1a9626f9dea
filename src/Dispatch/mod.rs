//! The dispatch core: commands, the token scheduler, the caller-side retry
//! protocol, the load balancer and the dispatcher built on top of them.

pub mod balancer;
pub mod channel;
pub mod command;
mod debug;
pub mod dispatcher;
pub mod retry;
pub mod scheduler;
pub mod worker;

pub use balancer::LoadBalancer;
pub use channel::{Channel, Envelope};
pub use command::{Applied, ChannelId, Command, CommandKind, CommandStatus};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use retry::{Backlog, Retry, Settled, Unsubmitted};
pub use scheduler::{Counters, Failure, Outcome, Phase, Scheduler, Status, WriteStep};
pub use worker::Worker;
