//! Execution context shared by every stage of a run.
//!
//! A [`StageContext`] carries the adapters, configuration, cancellation token,
//! event sink and run id. Cloning is cheap; fan-out workers take their own clone.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::adapters::ToolAdapterSet;
use crate::cancellation::CancellationToken;
use crate::config::ResearchConfig;
use crate::errors::AdapterError;
use crate::events::{EventSink, NoOpEventSink};

/// Everything a stage may use while executing.
#[derive(Clone)]
pub struct StageContext {
    adapters: Arc<ToolAdapterSet>,
    config: Arc<ResearchConfig>,
    token: Arc<CancellationToken>,
    sink: Arc<dyn EventSink>,
    run_id: Uuid,
}

impl StageContext {
    /// Creates a context with a fresh run id, a new token and no event sink.
    #[must_use]
    pub fn new(adapters: Arc<ToolAdapterSet>, config: Arc<ResearchConfig>) -> Self {
        Self {
            adapters,
            config,
            token: Arc::new(CancellationToken::new()),
            sink: Arc::new(NoOpEventSink),
            run_id: Uuid::new_v4(),
        }
    }

    /// Uses `token` for cancellation.
    #[must_use]
    pub fn with_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.token = token;
        self
    }

    /// Publishes lifecycle events to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Uses a specific run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// The adapters for this run.
    #[must_use]
    pub fn adapters(&self) -> &ToolAdapterSet {
        &self.adapters
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// The run's cancellation token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// The event sink.
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// The run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns true once the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Awaits an adapter call under a time budget and the run's cancellation.
    ///
    /// The call is dropped if either fires first. Errors from the call itself
    /// are passed through unchanged.
    pub async fn call<T, E, F>(&self, adapter: &str, timeout: Duration, call: F) -> Result<T, E>
    where
        E: From<AdapterError>,
        F: Future<Output = Result<T, E>>,
    {
        if self.token.is_cancelled() {
            return Err(AdapterError::cancelled(adapter).into());
        }

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(AdapterError::cancelled(adapter).into()),
            result = tokio::time::timeout(timeout, call) => match result {
                Ok(inner) => inner,
                Err(_) => Err(AdapterError::timeout(adapter, timeout).into()),
            },
        }
    }
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("run_id", &self.run_id)
            .field("adapters", &self.adapters)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GenerationError;
    use crate::testing::stub_adapters;

    fn context() -> StageContext {
        StageContext::new(Arc::new(stub_adapters()), Arc::new(ResearchConfig::default()))
    }

    #[tokio::test]
    async fn test_call_passes_result_through() {
        let ctx = context();
        let ok: Result<u32, AdapterError> = ctx.call("stub", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u32, AdapterError> = ctx
            .call("stub", Duration::from_secs(1), async { Err(AdapterError::status("stub", 500)) })
            .await;
        assert_eq!(err, Err(AdapterError::status("stub", 500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out() {
        let ctx = context();
        let result: Result<(), AdapterError> = ctx
            .call("slow", Duration::from_millis(50), async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(AdapterError::timeout("slow", Duration::from_millis(50))));
    }

    #[tokio::test]
    async fn test_call_observes_cancellation() {
        let ctx = context();
        let token = ctx.token().clone();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel("user abort");
        });

        let result: Result<(), GenerationError> = ctx
            .call("reasoner", Duration::from_secs(30), async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;

        canceller.await.unwrap();
        assert_eq!(result, Err(GenerationError::Adapter(AdapterError::cancelled("reasoner"))));
    }

    #[tokio::test]
    async fn test_call_refuses_after_cancel() {
        let ctx = context();
        ctx.token().cancel("done");
        let result: Result<(), AdapterError> = ctx.call("search", Duration::from_secs(1), async { Ok(()) }).await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
