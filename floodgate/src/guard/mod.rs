//! Reference-counted destruction guards for shared resources.
//!
//! A long-lived shared resource (a storage environment, a channel, a connection) must be
//! torn down exactly once, only after every in-flight operation using it has finished,
//! while new operations are rejected as soon as teardown has been requested. The guards
//! in this module gate access to such a resource without holding a reference to it; they
//! own only its one-shot destroy callback.
//!
//! # State machine
//!
//! Both guards pack their state into a single atomic word updated with compare-and-swap
//! retry loops, so the fast path takes no locks and [`Guard::acquire`] never waits:
//!
//! - **Active**: acquisitions succeed and bump the in-flight count.
//! - **Destroy pending**: [`Guard::destroy`] has latched the word; new acquisitions fail
//!   fast while in-flight ones run to completion.
//! - **Destroyed**: the in-flight count reached zero with destruction pending; whichever
//!   release (or `destroy` itself, when the guard was idle) claims this transition fires
//!   the callback, exactly once.
//!
//! [`StripedGuard`] spreads the count across independent stripes so that very hot
//! acquire/release traffic does not contend on one cache line.

mod striped;

pub use striped::StripedGuard;

use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, FloodgateResult};

/// One-shot resource teardown callback.
pub(crate) type DestroyFn = Box<dyn FnOnce() + Send>;

// State word layout: low bits hold the in-flight count, the two top bits hold the
// lifecycle flags. The count can never reach the flag bits in practice.
const DESTROY_REQUESTED: u64 = 1 << 62;
const DESTROYED: u64 = 1 << 63;
const COUNT_MASK: u64 = DESTROY_REQUESTED - 1;

/// A reference-counted gate that defers a resource's one-time teardown until all
/// in-flight uses finish.
///
/// The guard does not hold the resource itself, only its destroy callback. Callers wrap
/// each resource-using operation in [`Guard::acquire`]; the owner calls
/// [`Guard::destroy`] when the resource should go away. The callback fires exactly once,
/// on whichever thread's release observes the in-flight count reach zero with
/// destruction pending, or synchronously inside `destroy` when the guard is idle.
pub struct Guard {
    state: AtomicU64,
    on_destroy: Mutex<Option<DestroyFn>>,
}

impl Guard {
    /// Creates a guard bound to the given teardown callback.
    pub fn new<F>(on_destroy: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            state: AtomicU64::new(0),
            on_destroy: Mutex::new(Some(Box::new(on_destroy))),
        }
    }

    pub(crate) fn from_boxed(on_destroy: DestroyFn) -> Self {
        Self {
            state: AtomicU64::new(0),
            on_destroy: Mutex::new(Some(on_destroy)),
        }
    }

    /// Runs `supplier` under the guard.
    ///
    /// Increments the in-flight count if destruction has not been requested, otherwise
    /// fails immediately with [`ErrorKind::GuardDestroyed`] without waiting. The count is
    /// released when `supplier` returns, including by panic unwinding, and the
    /// supplier's outcome is propagated unchanged.
    pub fn acquire<F, R>(&self, supplier: F) -> FloodgateResult<R>
    where
        F: FnOnce() -> R,
    {
        self.enter()?;
        let _release = ReleaseOnDrop { guard: self };
        Ok(supplier())
    }

    /// Runs the future produced by `supplier` under the guard.
    ///
    /// Same contract as [`Guard::acquire`]; the count is released even when the returned
    /// future is dropped before completion.
    pub async fn acquire_with<F, Fut, R>(&self, supplier: F) -> FloodgateResult<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        self.enter()?;
        let _release = ReleaseOnDrop { guard: self };
        Ok(supplier().await)
    }

    /// Requests destruction of the guarded resource.
    ///
    /// Idempotent. If no acquisition is in flight the callback fires synchronously on
    /// the calling thread; otherwise it fires on whichever release drops the in-flight
    /// count to zero. This method never waits for in-flight work.
    pub fn destroy(&self) {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state & (DESTROY_REQUESTED | DESTROYED) != 0 {
                return;
            }

            match self.state.compare_exchange_weak(
                state,
                state | DESTROY_REQUESTED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => state = current,
            }
        }

        if state & COUNT_MASK == 0 {
            self.finalize();
        } else {
            debug!(
                in_flight = state & COUNT_MASK,
                "guard destruction deferred to last release"
            );
        }
    }

    /// Returns `true` once destruction has been requested.
    ///
    /// From that point on every [`Guard::acquire`] fails fast, even if the callback has
    /// not fired yet because acquisitions are still in flight.
    pub fn is_destroyed(&self) -> bool {
        self.state.load(Ordering::Acquire) & (DESTROY_REQUESTED | DESTROYED) != 0
    }

    /// Returns the point-in-time count of in-flight acquisitions.
    pub fn in_flight(&self) -> u64 {
        self.state.load(Ordering::Acquire) & COUNT_MASK
    }

    fn enter(&self) -> FloodgateResult<()> {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state & (DESTROY_REQUESTED | DESTROYED) != 0 {
                bail!(
                    ErrorKind::GuardDestroyed,
                    "Guard has been destroyed and no longer accepts acquisitions"
                );
            }

            debug_assert!(state & COUNT_MASK < COUNT_MASK, "in-flight count overflow");

            match self.state.compare_exchange_weak(
                state,
                state + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(current) => state = current,
            }
        }
    }

    fn release(&self) {
        let previous = self.state.fetch_sub(1, Ordering::AcqRel);
        let current = previous - 1;

        if current & COUNT_MASK == 0 && current & DESTROY_REQUESTED != 0 {
            self.finalize();
        }
    }

    /// Claims the terminal transition and fires the callback.
    ///
    /// The compare-exchange succeeds for exactly one caller across all racing releases
    /// and destroy requests; losers return without side effects.
    fn finalize(&self) {
        if self
            .state
            .compare_exchange(
                DESTROY_REQUESTED,
                DESTROY_REQUESTED | DESTROYED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let callback = {
            let mut slot = self
                .on_destroy
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };

        if let Some(callback) = callback {
            debug!("guard destroyed, running teardown callback");
            callback();
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Ordering::Acquire);
        f.debug_struct("Guard")
            .field("in_flight", &(state & COUNT_MASK))
            .field("destroy_requested", &(state & DESTROY_REQUESTED != 0))
            .field("destroyed", &(state & DESTROYED != 0))
            .finish()
    }
}

struct ReleaseOnDrop<'a> {
    guard: &'a Guard,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}
