pub mod config;
pub mod error;
pub mod idle;

pub use config::{DispatcherConfig, IdleStrategy, QueueKind};
pub use error::{DispatchError, DispatchResult, PublishError};
pub use idle::Idler;
