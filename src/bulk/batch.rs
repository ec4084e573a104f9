//! Bounded Batch Executor
//!
//! Runs independent mutations with a concurrency ceiling. Every task returns
//! its own `(id, result)` value; the outcome map is assembled only after all
//! tasks have joined, so no task ever writes shared state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::ApiError;
use super::types::Resource;

/// Default ceiling on simultaneous remote mutations
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Per-item results of one batch
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Failed items keyed by id. Absence of an id means success.
    pub failures: HashMap<String, ApiError>,
    /// Number of items whose operation was started
    pub dispatched: usize,
    /// Items never started because cancellation was observed first
    pub not_dispatched: Vec<String>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.not_dispatched.is_empty()
    }

    /// Ids that need another attempt: failures plus anything never started.
    pub fn unfinished_ids(&self) -> Vec<String> {
        self.failures
            .keys()
            .cloned()
            .chain(self.not_dispatched.iter().cloned())
            .collect()
    }
}

/// Executes one mutation per item with at most `concurrency` in flight.
#[derive(Debug, Clone)]
pub struct BoundedBatchExecutor {
    concurrency: usize,
    cancel: CancellationToken,
}

impl Default for BoundedBatchExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl BoundedBatchExecutor {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop dispatching new work once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `op` once for every item and wait for all of them to finish.
    ///
    /// A failing item never stops the others. Once cancellation is observed no
    /// further item is started; items already running are left to complete.
    pub async fn run<T, F, Fut>(&self, items: Vec<T>, op: F) -> BatchOutcome
    where
        T: Resource + Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut outcome = BatchOutcome::default();

        debug!(total, concurrency = self.concurrency, "Starting batch");

        let mut pending = items.into_iter();
        while let Some(item) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                outcome.not_dispatched.push(item.id().to_string());
                outcome
                    .not_dispatched
                    .extend(pending.by_ref().map(|rest| rest.id().to_string()));
                warn!(
                    skipped = outcome.not_dispatched.len(),
                    "Batch cancelled, not starting remaining items"
                );
                break;
            };

            let id = item.id().to_string();
            let call = op(item);
            tasks.spawn(async move {
                let _permit = permit;
                // Inner task so a panic is attributed to its own item
                let result = match tokio::spawn(call).await {
                    Ok(result) => result,
                    Err(join_error) => Err(ApiError::Transport(format!(
                        "operation aborted: {}",
                        join_error
                    ))),
                };
                (id, result)
            });
            outcome.dispatched += 1;
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(()))) => {
                    debug!(id = %id, "Item succeeded");
                }
                Ok((id, Err(e))) => {
                    warn!(id = %id, error = %e, "Item failed");
                    outcome.failures.insert(id, e);
                }
                Err(join_error) => {
                    warn!(error = %join_error, "Batch worker aborted");
                }
            }
        }

        debug!(
            total,
            dispatched = outcome.dispatched,
            failed = outcome.failures.len(),
            "Batch complete"
        );
        outcome
    }
}
