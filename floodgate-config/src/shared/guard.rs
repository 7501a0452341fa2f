use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for a striped guard.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GuardConfig {
    /// Number of stripes acquisitions are spread across.
    ///
    /// Rounded up to the next power of two by the guard itself.
    #[serde(default = "default_stripes")]
    pub stripes: usize,
}

impl GuardConfig {
    /// Default stripe count.
    pub const DEFAULT_STRIPES: usize = 64;

    /// Validates guard configuration settings.
    ///
    /// Ensures the stripe count is non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stripes == 0 {
            return Err(ValidationError::invalid_field(
                "guard.stripes",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            stripes: default_stripes(),
        }
    }
}

fn default_stripes() -> usize {
    GuardConfig::DEFAULT_STRIPES
}
