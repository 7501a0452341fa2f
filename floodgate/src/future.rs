use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::time::{Instant, Sleep, sleep_until};

pin_project! {
    /// Timer future for batch flush deadlines.
    ///
    /// An unarmed timer stays pending indefinitely, which makes it safe to select on
    /// even when no batch is in progress. An armed timer resolves once its deadline
    /// elapses.
    #[derive(Debug)]
    pub struct FlushTimer {
        #[pin]
        sleep: Option<Sleep>,
    }
}

impl FlushTimer {
    /// Creates a timer that never fires.
    pub fn unarmed() -> Self {
        Self { sleep: None }
    }

    /// Creates a timer that fires once `deadline` has elapsed.
    pub fn armed(deadline: Instant) -> Self {
        Self {
            sleep: Some(sleep_until(deadline)),
        }
    }

    /// Creates a timer from an optional deadline.
    pub fn from_deadline(deadline: Option<Instant>) -> Self {
        match deadline {
            Some(deadline) => Self::armed(deadline),
            None => Self::unarmed(),
        }
    }
}

impl Future for FlushTimer {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        match this.sleep.as_mut().as_pin_mut() {
            Some(sleep) => sleep.poll(cx),
            None => Poll::Pending,
        }
    }
}
