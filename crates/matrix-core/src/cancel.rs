//! Cooperative cancellation.
//!
//! The install flow checks the token before each stage and races it against
//! every suspension point (downloads, subprocesses, settings commits).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared flag that long-running operations poll or await.
///
/// Clones observe the same flag. Cancelling wakes every pending
/// [`CancellationToken::cancelled`] future.
///
/// ```
/// use matrix_core::cancel::CancellationToken;
///
/// let install = CancellationToken::new();
/// let ctrl_c = install.clone();
/// ctrl_c.cancel();
/// assert!(install.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    flag: AtomicBool,
    wake: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.shared.flag.store(true, SeqCst);
        self.shared.wake.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.flag.load(SeqCst)
    }

    /// `Err(CancelledError)` once cancelled.
    pub fn check(&self) -> Result<(), CancelledError> {
        match self.is_cancelled() {
            true => Err(CancelledError),
            false => Ok(()),
        }
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel() is not missed.
            let notified = self.shared.wake.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Drive `fut` to completion unless the token is cancelled first.
    pub async fn run_until_cancelled<F: Future>(&self, fut: F) -> Result<F::Output, CancelledError> {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(CancelledError),
            output = fut => Ok(output),
        }
    }
}

/// The operation stopped because its token was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Operation was cancelled")]
pub struct CancelledError;

impl From<CancelledError> for crate::error::MatrixError {
    fn from(_: CancelledError) -> Self {
        crate::error::MatrixError::Cancelled
    }
}
