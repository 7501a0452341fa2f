pub mod config;
pub mod error;
pub mod future;
pub mod guard;
pub mod queue;
pub mod shutdown;

mod macros;


pub mod prelude {
    //! Re-exports of the types most callers need.

    pub use crate::config::{
        BatchConfig, BatchQueueConfig, GuardConfig, QueueConfig, WorkQueueConfig,
    };
    pub use crate::error::{ErrorKind, FloodgateError, FloodgateResult};
    pub use crate::guard::{Guard, StripedGuard};
    pub use crate::queue::{
        BatchConsumer, BatchingBoundedQueue, CompletableQueue, WorkQueue, nearest_power_of_two,
    };
}
