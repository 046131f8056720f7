//! Macrotasks and one-shot timers.
//!
//! A macrotask defers a future to a later turn of the runtime rather than
//! running it inline — this is the engine's suspension point between
//! receiving a message and invoking the behavior, so timers and external
//! events interleave with message processing. Cancelling a macrotask
//! prevents a not-yet-run task from running; a task that has already
//! started clears its own handle and runs to completion.

use std::future::Future;
use std::time::Duration;

use tokio::task::AbortHandle;

/// Timer delays are clamped to this safe maximum.
pub(crate) const MAX_DELAY_MS: u64 = 2_147_483_647;

/// Clamps a delay to whole milliseconds, capped at [`MAX_DELAY_MS`].
/// Fractions of a millisecond are truncated toward zero.
pub(crate) fn clamp_delay(delay: Duration) -> Duration {
    Duration::from_millis(delay.as_millis().min(MAX_DELAY_MS as u128) as u64)
}

/// A future deferred to a later cooperative turn.
pub(crate) struct Macrotask {
    handle: AbortHandle,
}

impl Macrotask {
    pub fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(fut).abort_handle(),
        }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }
}

/// A one-shot wake after a delay.
pub(crate) struct Timer {
    handle: AbortHandle,
}

impl Timer {
    /// Runs `fut` once `delay` (clamped) has elapsed.
    pub fn after<F>(delay: Duration, fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = clamp_delay(delay);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fut.await;
        });
        Self {
            handle: handle.abort_handle(),
        }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }
}
