use std::sync::Arc;
use std::time::Duration;

use beacon_core::{run_guarded, CooperativeCancellationToken};
use beacon_types::{RawResults, WidgetError, WidgetResult};
use tokio::task::JoinSet;

use crate::analytics::{AnalyticsStore, SearchOutcome, SearchRequest};
use crate::http::StoreError;

const DEFAULT_BATCH_SIZE: usize = 16;
const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Fan-out settings for [`QueryExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Queries per multi-search call.
    pub batch_size: usize,
    /// Deadline for one multi-search call. Zero disables it.
    pub call_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
        }
    }
}

/// Dispatches composed queries to the analytics store in parallel batches.
#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<dyn AnalyticsStore>,
    config: ExecutorConfig,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn AnalyticsStore>, config: ExecutorConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> ExecutorConfig {
        self.config
    }

    /// Runs every request and returns the payloads keyed by query name.
    ///
    /// A transport failure in any batch fails the whole set. Queries the
    /// store rejected individually are recorded as failure markers. On
    /// cancellation in-flight batches are aborted and `Cancelled` returned.
    #[tracing::instrument(skip_all, fields(queries = requests.len()))]
    pub async fn execute(
        &self,
        requests: Vec<SearchRequest>,
        token: &CooperativeCancellationToken,
    ) -> WidgetResult<RawResults> {
        if token.is_cancelled() {
            return Err(WidgetError::Cancelled);
        }
        let mut results = RawResults::new();
        if requests.is_empty() {
            return Ok(results);
        }

        let mut batches = JoinSet::new();
        for chunk in requests.chunks(self.config.batch_size.max(1)) {
            let batch = chunk.to_vec();
            let store = Arc::clone(&self.store);
            let token = token.clone();
            let timeout = self.config.call_timeout;
            batches.spawn(async move {
                let outcome = run_guarded(&token, timeout, store.multi_search(&batch, &token)).await;
                (batch, outcome)
            });
        }
        tracing::debug!(batches = batches.len(), "dispatched multi-search batches");

        loop {
            let joined = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    batches.abort_all();
                    return Err(WidgetError::Cancelled);
                }
                joined = batches.join_next() => joined,
            };
            let Some(joined) = joined else {
                break;
            };
            let (batch, outcome) = joined.map_err(|error| WidgetError::StoreTransport {
                detail: format!("multi-search task failed: {error}"),
            })?;
            let outcomes = match outcome {
                Ok(inner) => inner,
                Err(guard) => Err(StoreError::from(guard)),
            }
            .map_err(|error| {
                tracing::warn!(error = %error, "multi-search batch failed");
                error.into_store_error()
            })?;

            if outcomes.len() != batch.len() {
                return Err(WidgetError::StoreTransport {
                    detail: format!(
                        "multi-search returned {} outcomes for {} queries",
                        outcomes.len(),
                        batch.len()
                    ),
                });
            }
            for (request, outcome) in batch.into_iter().zip(outcomes) {
                match outcome {
                    SearchOutcome::Hit(payload) => results.insert(request.name, payload),
                    SearchOutcome::Failed(reason) => {
                        tracing::warn!(query = %request.name, reason = %reason, "query failed");
                        results.insert_failure(request.name, reason);
                    }
                }
            }
        }

        Ok(results)
    }
}
