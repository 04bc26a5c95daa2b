//! Cancellation token shared by every stage and adapter call of a run.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::info;

use crate::core::StageKind;
use crate::errors::StageError;

#[derive(Debug, Clone)]
struct Cancellation {
    reason: String,
    at: DateTime<Utc>,
}

/// A token for cooperative cancellation of a research run.
///
/// Only the first cancellation counts. In-flight adapter calls race against
/// [`CancellationToken::cancelled`]; stages check [`ensure_active`] before
/// each attempt.
///
/// [`ensure_active`]: CancellationToken::ensure_active
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    state: RwLock<Option<Cancellation>>,
    notify: Notify,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation and wakes every waiter.
    ///
    /// Later calls are ignored; the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let reason = reason.into();
            info!(reason = %reason, "Run cancellation requested");
            *self.state.write() = Some(Cancellation {
                reason,
                at: Utc::now(),
            });
            self.notify.notify_waiters();
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The cancellation reason, if cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.state.read().as_ref().map(|c| c.reason.clone())
    }

    /// When cancellation was requested.
    #[must_use]
    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().as_ref().map(|c| c.at)
    }

    /// Fails with a cancellation error for `stage` if the run was cancelled.
    pub fn ensure_active(&self, stage: StageKind) -> Result<(), StageError> {
        if self.is_cancelled() {
            let reason = self.reason().unwrap_or_else(|| "cancelled".to_string());
            return Err(StageError::cancelled(stage, reason));
        }
        Ok(())
    }

    /// Completes once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
