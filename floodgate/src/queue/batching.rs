use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::bail;
use crate::config::{BatchConfig, BatchQueueConfig};
use crate::error::{ErrorKind, FloodgateResult};
use crate::floodgate_error;
use crate::future::FlushTimer;
use crate::queue::ring::RingBuffer;
use crate::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};

/// Trait for downstream stages that receive committed batches.
///
/// The consumer is invoked from the queue's single consumer task, so it is never
/// invoked concurrently with itself. Items arrive in enqueue order within a batch and
/// across successive batches; batch boundaries carry no semantic grouping.
///
/// Returning an error stops the consumer loop: the queue closes to producers and the
/// error is surfaced by [`BatchingBoundedQueue::shutdown`].
pub trait BatchConsumer<T>: Send + Sync + 'static {
    /// Receives one committed batch.
    fn consume(&self, batch: Vec<T>) -> impl Future<Output = FloodgateResult<()>> + Send;
}

impl<T, F, Fut> BatchConsumer<T> for F
where
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FloodgateResult<()>> + Send,
{
    fn consume(&self, batch: Vec<T>) -> impl Future<Output = FloodgateResult<()>> + Send {
        self(batch)
    }
}

struct Inner<T> {
    ring: RingBuffer<T>,
    closed: bool,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> Shared<T> {
    fn lock_inner(&self) -> MutexGuard<'_, Inner<T>> {
        // A poisoning panic cannot leave the ring in a torn state, so keep going.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A bounded queue that groups enqueued items into batches delivered by size or time.
///
/// Items land in a power-of-two ring buffer; a dedicated consumer task pulls them into
/// an in-progress batch and delivers it to the [`BatchConsumer`] when the batch reaches
/// `batch.max_size`, when `batch.max_fill_ms` elapses after the first item of the batch,
/// or on shutdown (final drain with exactly one trailing partial batch).
///
/// [`BatchingBoundedQueue::put`] suspends while the ring is full;
/// [`BatchingBoundedQueue::offer`] returns a flag instead. After
/// [`BatchingBoundedQueue::shutdown`] both fail with [`ErrorKind::QueueTerminated`].
pub struct BatchingBoundedQueue<T> {
    shared: Arc<Shared<T>>,
    shutdown_tx: ShutdownTx,
    consumer_task: Mutex<Option<JoinHandle<FloodgateResult<()>>>>,
}

impl<T: Send + 'static> BatchingBoundedQueue<T> {
    /// Creates the queue and starts its consumer task immediately.
    ///
    /// Must be called within a tokio runtime context.
    pub fn new<C>(config: &BatchQueueConfig, consumer: C) -> FloodgateResult<Self>
    where
        C: BatchConsumer<T>,
    {
        config.validate()?;

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                ring: RingBuffer::with_capacity(config.capacity),
                closed: false,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        });

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let consumer_task = tokio::spawn(run_consumer(
            Arc::clone(&shared),
            consumer,
            shutdown_rx,
            config.batch.clone(),
        ));

        Ok(Self {
            shared,
            shutdown_tx,
            consumer_task: Mutex::new(Some(consumer_task)),
        })
    }

    /// Enqueues `item`, suspending while the ring is full.
    pub async fn put(&self, item: T) -> FloodgateResult<()> {
        let mut item = item;
        loop {
            let not_full = self.shared.not_full.notified();
            tokio::pin!(not_full);

            {
                let mut inner = self.shared.lock_inner();
                if inner.closed {
                    bail!(
                        ErrorKind::QueueTerminated,
                        "Batching queue has been shut down"
                    );
                }

                match inner.ring.push(item) {
                    Ok(()) => {
                        drop(inner);
                        self.shared.not_empty.notify_one();
                        return Ok(());
                    }
                    Err(rejected) => {
                        item = rejected;
                        // Register interest before releasing the lock so a wakeup sent
                        // in between is not lost.
                        not_full.as_mut().enable();
                    }
                }
            }

            not_full.as_mut().await;
        }
    }

    /// Non-suspending variant of [`BatchingBoundedQueue::put`].
    ///
    /// Returns `Ok(false)` when the ring is full.
    pub fn offer(&self, item: T) -> FloodgateResult<bool> {
        let mut inner = self.shared.lock_inner();
        if inner.closed {
            bail!(
                ErrorKind::QueueTerminated,
                "Batching queue has been shut down"
            );
        }

        match inner.ring.push(item) {
            Ok(()) => {
                drop(inner);
                self.shared.not_empty.notify_one();
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Stops the queue: rejects further producers, drains buffered items through the
    /// consumer (full batches first, then exactly one final partial batch), and waits
    /// for the consumer task to exit.
    ///
    /// Returns the consumer's failure if the loop stopped on an error, mapping a
    /// panicked consumer task to [`ErrorKind::BatchConsumerPanic`]. Idempotent; later
    /// calls return `Ok(())`.
    pub async fn shutdown(&self) -> FloodgateResult<()> {
        {
            let mut inner = self.shared.lock_inner();
            inner.closed = true;
        }
        self.shared.not_full.notify_waiters();
        let _ = self.shutdown_tx.send(());

        let consumer_task = {
            let mut slot = self
                .consumer_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        let Some(consumer_task) = consumer_task else {
            return Ok(());
        };

        info!("batching queue shutting down, waiting for final flush");
        match consumer_task.await {
            Ok(result) => result,
            Err(err) => Err(floodgate_error!(
                ErrorKind::BatchConsumerPanic,
                "Batch consumer task panicked",
                err
            )),
        }
    }

    /// Point-in-time count of undelivered items still in the ring.
    pub fn len(&self) -> usize {
        self.shared.lock_inner().ring.len()
    }

    /// Point-in-time emptiness check for the ring.
    pub fn is_empty(&self) -> bool {
        self.shared.lock_inner().ring.is_empty()
    }

    /// Ring capacity after rounding up to a power of two.
    pub fn capacity(&self) -> usize {
        self.shared.lock_inner().ring.capacity()
    }
}

impl<T> fmt::Debug for BatchingBoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock_inner();
        f.debug_struct("BatchingBoundedQueue")
            .field("capacity", &inner.ring.capacity())
            .field("len", &inner.ring.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

/// Consumer loop owning the batching state machine.
///
/// Priorities per round: pull available items, emit on size, then wait on whichever of
/// new-items / flush-deadline / shutdown fires first. The deadline is armed when the
/// first item enters the in-progress batch and disarmed on every flush.
async fn run_consumer<T, C>(
    shared: Arc<Shared<T>>,
    consumer: C,
    mut shutdown_rx: ShutdownRx,
    config: BatchConfig,
) -> FloodgateResult<()>
where
    T: Send + 'static,
    C: BatchConsumer<T>,
{
    let max_size = config.max_size;
    let flush_after = Duration::from_millis(config.max_fill_ms);
    let mut batch: Vec<T> = Vec::with_capacity(max_size);
    let mut deadline: Option<Instant> = None;

    let result = loop {
        let pulled = {
            let mut inner = shared.lock_inner();
            let mut pulled = 0;
            while batch.len() < max_size {
                match inner.ring.pop() {
                    Some(item) => {
                        batch.push(item);
                        pulled += 1;
                    }
                    None => break,
                }
            }
            pulled
        };

        if pulled > 0 {
            // One wakeup per freed slot; surplus wakeups fall out of the recheck loops.
            for _ in 0..pulled {
                shared.not_full.notify_one();
            }
            if deadline.is_none() {
                deadline = Some(Instant::now() + flush_after);
            }
        }

        if batch.len() >= max_size {
            if let Err(err) = flush(&consumer, &mut batch, &mut deadline).await {
                break Err(err);
            }
            continue;
        }

        let not_empty = shared.not_empty.notified();
        tokio::pin!(not_empty);
        {
            let inner = shared.lock_inner();
            if !inner.ring.is_empty() {
                continue;
            }
            not_empty.as_mut().enable();
        }

        tokio::select! {
            _ = not_empty.as_mut() => {}
            _ = FlushTimer::from_deadline(deadline) => {
                if let Err(err) = flush(&consumer, &mut batch, &mut deadline).await {
                    break Err(err);
                }
            }
            _ = shutdown_rx.changed() => {
                break drain_and_flush(&shared, &consumer, &mut batch, &mut deadline, max_size).await;
            }
        }
    };

    // Whatever ended the loop, stop accepting items and release blocked producers.
    {
        let mut inner = shared.lock_inner();
        inner.closed = true;
    }
    shared.not_full.notify_waiters();

    if let Err(ref err) = result {
        error!(error = %err, "batch consumer loop stopped with error");
    }

    result
}

/// Final drain on shutdown: full batches first, then one trailing partial batch.
async fn drain_and_flush<T, C>(
    shared: &Arc<Shared<T>>,
    consumer: &C,
    batch: &mut Vec<T>,
    deadline: &mut Option<Instant>,
    max_size: usize,
) -> FloodgateResult<()>
where
    T: Send + 'static,
    C: BatchConsumer<T>,
{
    debug!("shutdown observed, draining remaining items");

    loop {
        {
            let mut inner = shared.lock_inner();
            while batch.len() < max_size {
                match inner.ring.pop() {
                    Some(item) => batch.push(item),
                    None => break,
                }
            }
        }

        if batch.len() >= max_size {
            flush(consumer, batch, deadline).await?;
            continue;
        }

        break;
    }

    flush(consumer, batch, deadline).await
}

/// Hands the in-progress batch to the consumer and disarms the flush deadline.
///
/// Delivering nothing is not a delivery: an empty batch is skipped.
async fn flush<T, C>(
    consumer: &C,
    batch: &mut Vec<T>,
    deadline: &mut Option<Instant>,
) -> FloodgateResult<()>
where
    C: BatchConsumer<T>,
{
    *deadline = None;
    if batch.is_empty() {
        return Ok(());
    }

    let items = std::mem::take(batch);
    debug!(batch_size = items.len(), "delivering batch to consumer");
    consumer.consume(items).await
}
