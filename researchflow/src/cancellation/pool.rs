//! Bounded-concurrency worker pool with ordered result collection.

use super::CancellationToken;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

/// Runs independent jobs with at most `limit` in flight.
///
/// Results travel back over a channel tagged with their input index and are
/// re-assembled in input order, so the output does not depend on completion
/// order. Once the token is cancelled no new job is started; jobs already
/// running are awaited so their results are kept.
pub struct WorkerPool {
    limit: usize,
    token: Arc<CancellationToken>,
}

impl WorkerPool {
    /// Creates a pool. A limit of zero is treated as one.
    #[must_use]
    pub fn new(limit: usize, token: Arc<CancellationToken>) -> Self {
        Self {
            limit: limit.max(1),
            token,
        }
    }

    /// Returns the concurrency limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Runs `job` over every item and returns one slot per item.
    ///
    /// A slot is `None` when its job never started (cancellation) or panicked.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, job: F) -> Vec<Option<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let job = Arc::new(job);
        let (tx, mut rx) = mpsc::channel::<(usize, R)>(total.max(1));
        let mut handles = Vec::with_capacity(total);

        for (index, item) in items.into_iter().enumerate() {
            if self.token.is_cancelled() {
                break;
            }

            let permit = tokio::select! {
                biased;
                () = self.token.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let tx = tx.clone();
            let job = job.clone();
            handles.push(tokio::spawn(async move {
                let result = job(index, item).await;
                drop(permit);
                // The receiver outlives every sender; a failed send means the
                // collector is gone and the result has nowhere to go.
                let _ = tx.send((index, result)).await;
            }));
        }

        let started = handles.len();
        drop(tx);

        let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
        while let Some((index, result)) = rx.recv().await {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(result);
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task failed");
            }
        }

        if started < total {
            debug!(started, total, "Worker pool drained after cancellation");
        }

        slots
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("limit", &self.limit)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
