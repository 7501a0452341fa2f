//! Configuration objects for floodgate.
//!
//! This module contains re-exported configurations that are needed by floodgate.

// Re-exports.
pub use floodgate_config::shared::*;
