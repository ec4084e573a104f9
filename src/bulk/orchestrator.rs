//! Bulk Orchestrator
//!
//! Composes the gate, the listing, the batch executor and the poller into the
//! flow every destructive command follows:
//!
//! ```text
//! gate-check -> collect -> { empty: stop | dry-run: report | execute } -> summarize
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::batch::{BatchOutcome, BoundedBatchExecutor, DEFAULT_CONCURRENCY};
use super::error::{ApiError, BulkError};
use super::gate::{CapabilityGate, GateOutcome};
use super::pagination::{fetch_all, ListOptions, PageSource};
use super::poller::{AsyncOperationPoller, BulkMutationStarter, OperationStatusSource, DEFAULT_UNIT};
use super::types::Resource;
use crate::cloudflare::permissions::Capability;

/// Default pause between persist-retry rounds
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Proof that the caller explicitly asked to act on every item.
///
/// Only obtainable through [`PurgeConfirmation::explicit`], so a missing
/// filter can never be turned into a delete-all by accident.
#[derive(Debug)]
pub struct PurgeConfirmation {
    _private: (),
}

impl PurgeConfirmation {
    pub fn explicit() -> Self {
        Self { _private: () }
    }
}

/// Which listed items an operation applies to
pub enum Selection<T> {
    Matching(Box<dyn Fn(&T) -> bool + Send + Sync>),
    Everything(PurgeConfirmation),
}

impl<T> Selection<T> {
    pub fn matching(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Selection::Matching(Box::new(predicate))
    }

    fn apply(&self, items: Vec<T>) -> Vec<T> {
        match self {
            Selection::Everything(_) => items,
            Selection::Matching(predicate) => items.into_iter().filter(|i| predicate(i)).collect(),
        }
    }
}

impl<T> std::fmt::Debug for Selection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selection::Matching(_) => f.write_str("Matching(..)"),
            Selection::Everything(_) => f.write_str("Everything"),
        }
    }
}

/// Knobs of one orchestrated run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub concurrency: usize,
    pub list: ListOptions,
    /// Resubmit failed items up to this many extra rounds
    pub persist_retry: Option<u32>,
    pub retry_delay: Duration,
    /// Return right after starting an async mutation
    pub no_wait: bool,
    pub poll_unit: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            concurrency: DEFAULT_CONCURRENCY,
            list: ListOptions::default(),
            persist_retry: None,
            retry_delay: DEFAULT_RETRY_DELAY,
            no_wait: false,
            poll_unit: DEFAULT_UNIT,
        }
    }
}

/// What a completed run did
#[derive(Debug, Default)]
pub struct RunSummary {
    pub selected: usize,
    pub failures: HashMap<String, ApiError>,
    pub not_dispatched: Vec<String>,
    /// Retry rounds used after the first attempt
    pub retries: u32,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.failures.len() + self.not_dispatched.len()
    }

    pub fn succeeded(&self) -> usize {
        self.selected.saturating_sub(self.failed())
    }

    /// Escalate any failure into [`BulkError::BatchFailed`].
    pub fn into_result(self) -> Result<RunSummary, BulkError> {
        if self.failed() > 0 {
            return Err(BulkError::BatchFailed {
                selected: self.selected,
                failed: self.failed(),
            });
        }
        Ok(self)
    }
}

#[derive(Debug)]
pub enum RunOutcome<T> {
    NothingToDo,
    DryRun { items: Vec<T> },
    Completed(RunSummary),
    /// Async mutation started and not awaited
    Started { operation_id: String },
}

pub struct Orchestrator<'a> {
    gate: CapabilityGate<'a>,
    required: Vec<Capability>,
    cancel: CancellationToken,
    /// Outcome of the first passing check, reused for the rest of the run
    authorized: OnceCell<GateOutcome>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(gate: CapabilityGate<'a>, required: &[Capability]) -> Self {
        Self {
            gate,
            required: required.to_vec(),
            cancel: CancellationToken::new(),
            authorized: OnceCell::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the capability gate once; later calls return the cached outcome.
    pub async fn authorize(&self) -> Result<GateOutcome, BulkError> {
        let outcome = self
            .authorized
            .get_or_try_init(|| async {
                let outcome = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(BulkError::CheckCancelled),
                    outcome = self.gate.check(&self.required) => outcome?,
                };
                debug!(outcome = ?outcome, "Permission check passed");
                Ok(outcome)
            })
            .await?;
        Ok(*outcome)
    }

    /// List every item of `source` and keep the selected ones.
    ///
    /// Fails closed: a listing that stopped early is an error, never a
    /// smaller selection.
    pub async fn collect<S>(
        &self,
        source: &S,
        selection: &Selection<S::Item>,
        list: &ListOptions,
    ) -> Result<Vec<S::Item>, BulkError>
    where
        S: PageSource + ?Sized,
    {
        let listed = fetch_all(source, list, &self.cancel).await?;
        let total = listed.len();
        let selected = selection.apply(listed);
        info!(total, selected = selected.len(), "Collected items");
        Ok(selected)
    }

    /// Gate, list, select and delete.
    pub async fn delete<S, F, Fut>(
        &self,
        source: &S,
        selection: Selection<S::Item>,
        options: &RunOptions,
        op: F,
    ) -> Result<RunOutcome<S::Item>, BulkError>
    where
        S: PageSource + ?Sized,
        S::Item: Resource + Clone + 'static,
        F: Fn(S::Item) -> Fut,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        self.authorize().await?;
        let items = self.collect(source, &selection, &options.list).await?;
        self.execute(items, options, op).await
    }

    /// Run `op` over already selected items. The caller is responsible for
    /// having called [`Orchestrator::authorize`].
    pub async fn execute<T, F, Fut>(
        &self,
        items: Vec<T>,
        options: &RunOptions,
        op: F,
    ) -> Result<RunOutcome<T>, BulkError>
    where
        T: Resource + Clone + Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        if items.is_empty() {
            info!("Nothing selected");
            return Ok(RunOutcome::NothingToDo);
        }
        if options.dry_run {
            info!(selected = items.len(), "Dry run, not making changes");
            return Ok(RunOutcome::DryRun { items });
        }

        let started = Instant::now();
        let selected = items.len();
        let by_id: HashMap<String, T> = items
            .iter()
            .map(|item| (item.id().to_string(), item.clone()))
            .collect();
        let executor =
            BoundedBatchExecutor::new(options.concurrency).with_cancellation(self.cancel.clone());

        let mut outcome = executor.run(items, &op).await;
        let mut retries = 0u32;

        if let Some(max_rounds) = options.persist_retry {
            while !outcome.is_success() && retries < max_rounds {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(options.retry_delay) => {}
                }
                retries += 1;
                let retry: Vec<T> = outcome
                    .unfinished_ids()
                    .iter()
                    .filter_map(|id| by_id.get(id).cloned())
                    .collect();
                warn!(round = retries, remaining = retry.len(), "Retrying failed items");
                outcome = executor.run(retry, &op).await;
            }
        }

        Ok(RunOutcome::Completed(summarize(selected, outcome, retries, started)))
    }

    /// Gate, then replace the remote collection with `items` in one
    /// server-side operation and wait for it unless `no_wait` is set.
    pub async fn replace<B>(
        &self,
        starter: &B,
        status: &dyn OperationStatusSource,
        items: Vec<B::Item>,
        options: &RunOptions,
    ) -> Result<RunOutcome<B::Item>, BulkError>
    where
        B: BulkMutationStarter + ?Sized,
    {
        self.authorize().await?;
        if items.is_empty() {
            info!("Nothing to replace");
            return Ok(RunOutcome::NothingToDo);
        }
        if options.dry_run {
            info!(selected = items.len(), "Dry run, not starting bulk operation");
            return Ok(RunOutcome::DryRun { items });
        }

        let started = Instant::now();
        let selected = items.len();
        let handle = starter.start(items).await?;
        info!(operation_id = %handle, "Started bulk operation");
        if options.no_wait {
            return Ok(RunOutcome::Started {
                operation_id: handle.id,
            });
        }

        AsyncOperationPoller::new(status)
            .with_unit(options.poll_unit)
            .with_cancellation(self.cancel.clone())
            .poll(&handle)
            .await?;

        Ok(RunOutcome::Completed(RunSummary {
            selected,
            elapsed: started.elapsed(),
            ..RunSummary::default()
        }))
    }
}

fn summarize(selected: usize, outcome: BatchOutcome, retries: u32, started: Instant) -> RunSummary {
    let summary = RunSummary {
        selected,
        failures: outcome.failures,
        not_dispatched: outcome.not_dispatched,
        retries,
        elapsed: started.elapsed(),
    };
    info!(
        selected = summary.selected,
        failed = summary.failed(),
        retries,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Run complete"
    );
    summary
}
