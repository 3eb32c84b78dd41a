//! Cancellation of in-progress retrievals
//!
//! A [`CancelToken`] is a cheap cloneable handle shared between the caller
//! and running retrievals. Once cancelled it stays cancelled: in-flight leaf
//! requests are dropped, the remaining ones are never issued and the
//! retrieval fails with [`ClientError::Cancelled`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Default)]
struct Signal {
    fired: AtomicBool,
    notify: Notify,
}

/// One-shot cancellation signal; clones observe the same signal
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    signal: Arc<Signal>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal, waking every waiter
    ///
    /// Later calls are no-ops.
    pub fn cancel(&self) {
        if !self.signal.fired.swap(true, Ordering::SeqCst) {
            debug!("Retrieval cancelled");
            self.signal.notify.notify_waiters();
        }
    }

    /// Whether the signal has fired
    pub fn is_cancelled(&self) -> bool {
        self.signal.fired.load(Ordering::SeqCst)
    }

    /// Resolve once the signal has fired
    pub async fn cancelled(&self) {
        // Registered before the check so a concurrent `cancel` is not missed
        let notified = self.signal.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Drive `work` unless the signal fires first
    ///
    /// Nothing is polled when the token is already cancelled.
    ///
    /// # Errors
    /// Returns `ClientError::Cancelled` if the signal fired first, otherwise
    /// the outcome of `work`
    pub async fn run<T, F>(&self, work: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        if self.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ClientError::Cancelled),
            outcome = work => outcome,
        }
    }

    /// Guard that cancels this token when dropped
    ///
    /// Ties the retrievals sharing the token to the lifetime of a scope.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            token: Some(self.clone()),
        }
    }
}

/// Cancels its token on drop unless disarmed
#[derive(Debug)]
pub struct CancelOnDrop {
    token: Option<CancelToken>,
}

impl CancelOnDrop {
    /// Keep the token alive past the guard
    pub fn disarm(mut self) -> CancelToken {
        self.token.take().unwrap_or_default()
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}
