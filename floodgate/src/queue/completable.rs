use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::Stream;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::bail;
use crate::config::QueueConfig;
use crate::error::{ErrorKind, FloodgateResult};

/// Queue lifecycle.
///
/// Modeled as one enumeration guarded by the buffer lock rather than independent
/// booleans, so impossible combinations cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    /// Accepting items and handing them out.
    Open,
    /// No new items; buffered items still drain to consumers.
    Completing,
    /// Buffered items discarded; every operation fails immediately.
    Terminated,
}

#[derive(Debug)]
struct QueueInner<T> {
    items: VecDeque<T>,
    state: LifecycleState,
}

/// A bounded FIFO queue supporting graceful completion and hard termination.
///
/// Producers suspend in [`CompletableQueue::put`] while the queue is full; consumers
/// suspend in [`CompletableQueue::take`] while it is empty. [`CompletableQueue::complete`]
/// stops intake but lets buffered items drain, after which retrieval reports
/// [`ErrorKind::QueueCompleted`] as an end-of-stream marker.
/// [`CompletableQueue::terminate`] discards buffered items and releases every waiting
/// caller with [`ErrorKind::QueueTerminated`].
///
/// Items are delivered in global FIFO order across all producers combined; no
/// per-producer ordering beyond that is promised.
pub struct CompletableQueue<T> {
    capacity: usize,
    inner: Mutex<QueueInner<T>>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> CompletableQueue<T> {
    /// Creates a queue buffering at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                state: LifecycleState::Open,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Creates a queue from a validated configuration.
    pub fn with_config(config: &QueueConfig) -> FloodgateResult<Self> {
        config.validate()?;
        Ok(Self::new(config.capacity))
    }

    /// Enqueues `item`, suspending while the queue is full.
    ///
    /// Fails with [`ErrorKind::QueueCompleted`] once completion has been requested (no
    /// late entries) and with [`ErrorKind::QueueTerminated`] once terminated, including
    /// for callers already suspended when the transition happens.
    pub async fn put(&self, item: T) -> FloodgateResult<()> {
        loop {
            let not_full = self.not_full.notified();
            tokio::pin!(not_full);

            {
                let mut inner = self.lock_inner();
                match inner.state {
                    LifecycleState::Open => {}
                    LifecycleState::Completing => bail!(
                        ErrorKind::QueueCompleted,
                        "Queue is completing and no longer accepts items"
                    ),
                    LifecycleState::Terminated => bail!(
                        ErrorKind::QueueTerminated,
                        "Queue has been terminated"
                    ),
                }

                if inner.items.len() < self.capacity {
                    inner.items.push_back(item);
                    drop(inner);
                    self.not_empty.notify_one();
                    return Ok(());
                }

                // Register interest before releasing the lock so a wakeup sent in
                // between is not lost.
                not_full.as_mut().enable();
            }

            not_full.as_mut().await;
        }
    }

    /// Removes the oldest item, suspending while the queue is empty and still open.
    ///
    /// Once the queue is completing and fully drained, this and every subsequent call
    /// fail with [`ErrorKind::QueueCompleted`]. Termination fails this call with
    /// [`ErrorKind::QueueTerminated`] immediately, even while suspended.
    pub async fn take(&self) -> FloodgateResult<T> {
        loop {
            let not_empty = self.not_empty.notified();
            tokio::pin!(not_empty);

            {
                let mut inner = self.lock_inner();
                if inner.state == LifecycleState::Terminated {
                    bail!(ErrorKind::QueueTerminated, "Queue has been terminated");
                }

                if let Some(item) = inner.items.pop_front() {
                    drop(inner);
                    self.not_full.notify_one();
                    return Ok(item);
                }

                if inner.state == LifecycleState::Completing {
                    bail!(
                        ErrorKind::QueueCompleted,
                        "Queue has completed and all items were drained"
                    );
                }

                not_empty.as_mut().enable();
            }

            not_empty.as_mut().await;
        }
    }

    /// Non-suspending variant of [`CompletableQueue::take`].
    ///
    /// Returns `Ok(None)` when the queue is empty but still live.
    pub fn try_take(&self) -> FloodgateResult<Option<T>> {
        let mut inner = self.lock_inner();
        if inner.state == LifecycleState::Terminated {
            bail!(ErrorKind::QueueTerminated, "Queue has been terminated");
        }

        if let Some(item) = inner.items.pop_front() {
            drop(inner);
            self.not_full.notify_one();
            return Ok(Some(item));
        }

        if inner.state == LifecycleState::Completing {
            bail!(
                ErrorKind::QueueCompleted,
                "Queue has completed and all items were drained"
            );
        }

        Ok(None)
    }

    /// Bounded-wait variant of [`CompletableQueue::take`].
    ///
    /// Returns `Ok(None)` when `wait` elapses without an item; completion and
    /// termination are reported the same way as [`CompletableQueue::take`].
    pub async fn take_timeout(&self, wait: Duration) -> FloodgateResult<Option<T>> {
        match timeout(wait, self.take()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Requests graceful completion: no new items, buffered items still drain.
    ///
    /// Idempotent; has no effect after [`CompletableQueue::terminate`]. Wakes every
    /// suspended caller so producers fail fast and consumers can observe the drained
    /// state.
    pub fn complete(&self) {
        let mut inner = self.lock_inner();
        if inner.state != LifecycleState::Open {
            return;
        }

        inner.state = LifecycleState::Completing;
        let remaining = inner.items.len();
        drop(inner);

        debug!(remaining, "queue completing, remaining items will drain");
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// Terminates the queue immediately, discarding buffered items.
    ///
    /// Idempotent. Every suspended and future caller fails with
    /// [`ErrorKind::QueueTerminated`].
    pub fn terminate(&self) {
        let mut inner = self.lock_inner();
        if inner.state == LifecycleState::Terminated {
            return;
        }

        let discarded = inner.items.len();
        inner.state = LifecycleState::Terminated;
        inner.items.clear();
        drop(inner);

        info!(discarded, "queue terminated, buffered items discarded");
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// Point-in-time item count; non-authoritative under concurrent mutation.
    pub fn len(&self) -> usize {
        self.lock_inner().items.len()
    }

    /// Point-in-time emptiness check; non-authoritative under concurrent mutation.
    pub fn is_empty(&self) -> bool {
        self.lock_inner().items.is_empty()
    }

    /// Maximum number of buffered items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock_inner(&self) -> MutexGuard<'_, QueueInner<T>> {
        // A poisoning panic cannot leave the buffer in a torn state, so keep going.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + 'static> CompletableQueue<T> {
    /// Adapts the queue into a [`Stream`] that drains it until completion or
    /// termination.
    pub fn into_stream(self: Arc<Self>) -> impl Stream<Item = T> {
        futures::stream::unfold(self, |queue| async move {
            match queue.take().await {
                Ok(item) => Some((item, queue)),
                Err(_) => None,
            }
        })
    }
}

impl<T> fmt::Debug for CompletableQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock_inner();
        f.debug_struct("CompletableQueue")
            .field("capacity", &self.capacity)
            .field("len", &inner.items.len())
            .field("state", &inner.state)
            .finish()
    }
}
