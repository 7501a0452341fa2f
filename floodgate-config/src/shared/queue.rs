use serde::{Deserialize, Serialize};

use crate::shared::{BatchConfig, ValidationError};

/// Configuration for a bounded completable queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QueueConfig {
    /// Maximum number of items the queue buffers before producers wait.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl QueueConfig {
    /// Default queue capacity.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Validates queue configuration settings.
    ///
    /// Ensures capacity is non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.capacity == 0 {
            return Err(ValidationError::invalid_field(
                "queue.capacity",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

/// Configuration for a batching bounded queue.
///
/// Contains the buffer bound plus the batch delivery settings. The capacity is
/// rounded up to the next power of two by the queue itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchQueueConfig {
    /// Maximum number of undelivered items buffered before producers wait.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    /// Batch delivery configuration.
    #[serde(default)]
    pub batch: BatchConfig,
}

impl BatchQueueConfig {
    /// Validates batch queue configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.capacity == 0 {
            return Err(ValidationError::invalid_field(
                "queue.capacity",
                "must be greater than 0",
            ));
        }

        self.batch.validate()?;

        Ok(())
    }
}

impl Default for BatchQueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            batch: BatchConfig::default(),
        }
    }
}

fn default_queue_capacity() -> usize {
    QueueConfig::DEFAULT_CAPACITY
}
