//! Per-request cancellation shared by every suspension point of a widget
//! request (analytics store, organization directory, function producers).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;

/// Cooperative cancellation token shared across the stages of one request.
#[derive(Debug, Clone, Default)]
pub struct CooperativeCancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CooperativeCancellationToken {
    /// Creates a new, not-yet-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token as cancelled and wakes pending waiters.
    pub fn cancel(&self) {
        let already_cancelled = self.cancelled.swap(true, Ordering::SeqCst);
        if !already_cancelled {
            self.notify.notify_waiters();
        }
    }

    /// Returns true when cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel is not lost.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Why a guarded external call did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GuardedCallError {
    #[error("request cancelled")]
    Cancelled,
    #[error("external call exceeded {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

/// Runs `call` until it completes, the token is cancelled, or `timeout` elapses.
///
/// A zero `timeout` disables the deadline. Cancellation wins over completion
/// when both are ready, and the in-flight call is dropped without waiting.
pub async fn run_guarded<F, T>(
    token: &CooperativeCancellationToken,
    timeout: Duration,
    call: F,
) -> Result<T, GuardedCallError>
where
    F: Future<Output = T>,
{
    if token.is_cancelled() {
        return Err(GuardedCallError::Cancelled);
    }

    if timeout.is_zero() {
        return tokio::select! {
            biased;
            _ = token.cancelled() => Err(GuardedCallError::Cancelled),
            value = call => Ok(value),
        };
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(GuardedCallError::Cancelled),
        timed = tokio::time::timeout(timeout, call) => timed.map_err(|_| GuardedCallError::TimedOut {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
