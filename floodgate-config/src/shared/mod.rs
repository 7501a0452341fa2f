//! Shared configuration types for floodgate primitives.

mod base;
mod batch;
mod guard;
mod queue;
mod work;

pub use base::ValidationError;
pub use batch::BatchConfig;
pub use guard::GuardConfig;
pub use queue::{BatchQueueConfig, QueueConfig};
pub use work::WorkQueueConfig;
