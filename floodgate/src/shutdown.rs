//! Shutdown signaling for queue consumer tasks.
//!
//! This module abstracts tokio's watch channels into a broadcast-style shutdown signal.
//! A single transmitter can stop any number of listening tasks; listeners observe the
//! signal at their next coordination point rather than being cancelled mid-operation,
//! which lets them drain buffered work before exiting.

use tokio::sync::watch;

/// Transmitter side of a shutdown signal channel.
pub type ShutdownTx = watch::Sender<()>;

/// Receiver side of a shutdown signal channel.
///
/// Listeners await [`watch::Receiver::changed`] to observe the signal. The receiver can
/// be cloned so several tasks react to the same shutdown request.
pub type ShutdownRx = watch::Receiver<()>;

/// Creates a new shutdown signal channel.
///
/// The channel starts in the "not signaled" state; only a send after subscription wakes
/// listeners.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (tx, rx)
}
