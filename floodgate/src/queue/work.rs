use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use tokio::sync::{Notify, Semaphore};
use tracing::error;

use crate::config::WorkQueueConfig;
use crate::error::FloodgateResult;

/// A bounded-concurrency gate for task execution on the shared runtime.
///
/// At most `max_concurrency` submitted tasks execute at any instant. Excess submissions
/// queue up to `queue_capacity`; once the queue is also exhausted,
/// [`WorkQueue::exec`] suspends the submitter until a spot frees up. Completion of a
/// task, by success or panic, releases its slot and lets the next queued task run.
///
/// A panicking task is logged and isolated; it never stops the queue.
pub struct WorkQueue {
    /// Bounds admitted-but-unfinished tasks at `max_concurrency + queue_capacity`.
    admission: Arc<Semaphore>,
    /// Bounds executing tasks at `max_concurrency`.
    slots: Arc<Semaphore>,
    tracker: Arc<WorkTracker>,
    max_concurrency: usize,
}

/// Count of admitted-but-unfinished tasks, with an idle wakeup.
struct WorkTracker {
    in_flight: AtomicUsize,
    idle: Notify,
}

impl WorkTracker {
    fn enter(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    fn exit(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl WorkQueue {
    /// Creates a work queue running at most `max_concurrency` tasks at once, queueing
    /// up to `queue_capacity` more.
    pub fn new(max_concurrency: usize, queue_capacity: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);

        Self {
            admission: Arc::new(Semaphore::new(max_concurrency + queue_capacity)),
            slots: Arc::new(Semaphore::new(max_concurrency)),
            tracker: Arc::new(WorkTracker {
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
            max_concurrency,
        }
    }

    /// Creates a work queue from a validated configuration.
    pub fn with_config(config: &WorkQueueConfig) -> FloodgateResult<Self> {
        config.validate()?;
        Ok(Self::new(config.max_concurrency, config.queue_capacity))
    }

    /// Submits `task` for execution once a concurrency slot is available.
    ///
    /// Returns as soon as the task is admitted; suspends only when both the run slots
    /// and the queue capacity are exhausted. The task itself starts whenever a slot
    /// frees up, in admission order.
    pub async fn exec<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let admission = Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .expect("work queue semaphores are never closed");
        self.tracker.enter();

        let slots = Arc::clone(&self.slots);
        let tracker = Arc::clone(&self.tracker);
        tokio::spawn(async move {
            let _admission = admission;
            if let Ok(_slot) = slots.acquire_owned().await {
                if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                    error!("submitted task panicked, slot released");
                }
            }
            tracker.exit();
        });
    }

    /// Point-in-time count of admitted-but-unfinished tasks.
    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight.load(Ordering::Acquire)
    }

    /// Maximum number of simultaneously executing tasks.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Suspends until every admitted task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.tracker.idle.notified();
            tokio::pin!(idle);

            if self.tracker.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.as_mut().enable();
            if self.tracker.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }

            idle.as_mut().await;
        }
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("max_concurrency", &self.max_concurrency)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
