use std::fmt;
use std::future::Future;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::GuardConfig;
use crate::error::FloodgateResult;
use crate::guard::{DestroyFn, Guard};
use crate::queue::nearest_power_of_two;

/// A sharded [`Guard`] that spreads acquire/release traffic across independent stripes.
///
/// Under many concurrent callers a single counter word is a hot cache line; every
/// acquisition spins on the same compare-and-swap target. The striped variant keeps one
/// [`Guard`] per stripe and routes each acquisition to one of them, preserving the exact
/// external contract: the shared teardown callback fires once, only after every stripe
/// has drained with destruction pending.
///
/// Stripe selection is a uniform random pick; the distribution is a throughput detail,
/// not a correctness requirement.
pub struct StripedGuard {
    stripes: Box<[Guard]>,
    stripe_mask: usize,
}

/// Coordination state shared by all stripes of one [`StripedGuard`].
struct SharedDestroy {
    remaining: AtomicUsize,
    on_destroy: Mutex<Option<DestroyFn>>,
}

impl SharedDestroy {
    /// Records one stripe reaching its destroyed state; the last stripe fires the
    /// shared callback.
    fn stripe_destroyed(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
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
            debug!("all stripes destroyed, running teardown callback");
            callback();
        }
    }
}

impl StripedGuard {
    /// Creates a striped guard with the default stripe count.
    pub fn new<F>(on_destroy: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::with_stripes(GuardConfig::DEFAULT_STRIPES, on_destroy)
    }

    /// Creates a striped guard from a validated configuration.
    pub fn with_config<F>(config: &GuardConfig, on_destroy: F) -> FloodgateResult<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        config.validate()?;
        Ok(Self::with_stripes(config.stripes, on_destroy))
    }

    /// Creates a striped guard with `stripes` counters, rounded up to a power of two.
    pub fn with_stripes<F>(stripes: usize, on_destroy: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let stripes = nearest_power_of_two(stripes);
        let shared = Arc::new(SharedDestroy {
            remaining: AtomicUsize::new(stripes),
            on_destroy: Mutex::new(Some(Box::new(on_destroy))),
        });

        let stripes = (0..stripes)
            .map(|_| {
                let shared = Arc::clone(&shared);
                Guard::from_boxed(Box::new(move || shared.stripe_destroyed()))
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            stripe_mask: stripes.len() - 1,
            stripes,
        }
    }

    /// Runs `supplier` under one stripe of the guard.
    ///
    /// Same contract as [`Guard::acquire`]. A stripe that has already latched
    /// destruction rejects the acquisition even if other stripes are still active.
    pub fn acquire<F, R>(&self, supplier: F) -> FloodgateResult<R>
    where
        F: FnOnce() -> R,
    {
        self.stripes[self.select_stripe()].acquire(supplier)
    }

    /// Runs the future produced by `supplier` under one stripe of the guard.
    ///
    /// Same contract as [`Guard::acquire_with`].
    pub async fn acquire_with<F, Fut, R>(&self, supplier: F) -> FloodgateResult<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        self.stripes[self.select_stripe()].acquire_with(supplier).await
    }

    /// Requests destruction on every stripe.
    ///
    /// Idempotent and non-waiting, like [`Guard::destroy`]. The shared callback fires
    /// exactly once, when the last stripe reaches zero in-flight acquisitions.
    pub fn destroy(&self) {
        for stripe in &self.stripes {
            stripe.destroy();
        }
    }

    /// Returns `true` once destruction has been requested on every stripe.
    pub fn is_destroyed(&self) -> bool {
        self.stripes.iter().all(Guard::is_destroyed)
    }

    /// Returns the stripe count (always a power of two).
    pub fn stripes(&self) -> usize {
        self.stripes.len()
    }

    /// Returns the point-in-time in-flight count summed across stripes.
    pub fn in_flight(&self) -> u64 {
        self.stripes.iter().map(Guard::in_flight).sum()
    }

    fn select_stripe(&self) -> usize {
        rand::random::<usize>() & self.stripe_mask
    }
}

impl fmt::Debug for StripedGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripedGuard")
            .field("stripes", &self.stripes.len())
            .field("in_flight", &self.in_flight())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
