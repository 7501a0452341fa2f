//! Shared support for floodgate integration tests.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use floodgate::error::FloodgateResult;
use floodgate::queue::BatchConsumer;
use tokio::sync::Notify;
use tokio::time::timeout;

/// Upper bound on any single wait inside a test.
///
/// Waiting longer than this means the expected state was never reached; panicking keeps
/// the failure readable instead of hanging the test run.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Initializes test logging once for the whole test binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Batch consumer that records every delivered batch and wakes waiters per delivery.
#[derive(Clone, Default)]
pub struct CollectingConsumer {
    batches: Arc<Mutex<Vec<Vec<u64>>>>,
    flushes: Arc<Notify>,
}

impl CollectingConsumer {
    /// Returns the delivered batches in delivery order.
    pub fn batches(&self) -> Vec<Vec<u64>> {
        self.batches.lock().unwrap().clone()
    }

    /// Returns all delivered items flattened across batches, in delivery order.
    pub fn flattened(&self) -> Vec<u64> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .copied()
            .collect()
    }

    /// Waits until at least `count` batches have been delivered.
    ///
    /// # Panics
    ///
    /// Panics after [`DEFAULT_WAIT_TIMEOUT`] so a stuck queue fails fast.
    pub async fn wait_for_batch_count(&self, count: usize) {
        let reached = async {
            loop {
                let notified = self.flushes.notified();
                tokio::pin!(notified);

                if self.batches.lock().unwrap().len() >= count {
                    return;
                }
                notified.as_mut().enable();
                if self.batches.lock().unwrap().len() >= count {
                    return;
                }

                notified.as_mut().await;
            }
        };

        if timeout(DEFAULT_WAIT_TIMEOUT, reached).await.is_err() {
            panic!(
                "Timed out waiting for {count} batch deliveries after {:?}",
                DEFAULT_WAIT_TIMEOUT
            );
        }
    }
}

impl BatchConsumer<u64> for CollectingConsumer {
    fn consume(&self, batch: Vec<u64>) -> impl Future<Output = FloodgateResult<()>> + Send {
        let batches = Arc::clone(&self.batches);
        let flushes = Arc::clone(&self.flushes);
        async move {
            batches.lock().unwrap().push(batch);
            flushes.notify_waiters();
            Ok(())
        }
    }
}

/// Tracks the number of concurrently executing tasks and the observed high-water mark.
#[derive(Clone, Default)]
pub struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    high_water: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    /// Marks one task as executing and records a new high-water mark if reached.
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
    }

    /// Marks one task as finished.
    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of tasks observed executing at the same time.
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }
}
