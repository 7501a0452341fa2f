use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for a bounded-concurrency work queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkQueueConfig {
    /// Maximum number of tasks executing at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Number of tasks that may wait for a slot before submitters wait too.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl WorkQueueConfig {
    /// Default maximum concurrency.
    pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

    /// Default queue capacity.
    pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

    /// Validates work queue configuration settings.
    ///
    /// Ensures max_concurrency is non-zero. A zero queue capacity is allowed and
    /// makes submitters wait as soon as all slots are busy.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_concurrency == 0 {
            return Err(ValidationError::invalid_field(
                "work_queue.max_concurrency",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for WorkQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_max_concurrency() -> usize {
    WorkQueueConfig::DEFAULT_MAX_CONCURRENCY
}

fn default_queue_capacity() -> usize {
    WorkQueueConfig::DEFAULT_QUEUE_CAPACITY
}
