//! Async Operation Poller
//!
//! Some mutations (replacing every item of a list) are accepted by the remote
//! and finished later. The start call returns an operation handle which is
//! polled here with a stepped exponential backoff.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::error::{ApiError, BulkError};
use super::types::{OperationHandle, OperationStatus};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;
pub const DEFAULT_UNIT: Duration = Duration::from_secs(1);

/// Reports the status of a previously started operation
#[async_trait]
pub trait OperationStatusSource: Send + Sync {
    async fn operation_status(&self, handle: &OperationHandle) -> Result<OperationStatus, ApiError>;
}

/// Starts a server-side bulk mutation over `items`
#[async_trait]
pub trait BulkMutationStarter: Send + Sync {
    type Item: Send;

    async fn start(&self, items: Vec<Self::Item>) -> Result<OperationHandle, ApiError>;
}

pub struct AsyncOperationPoller<'a> {
    source: &'a dyn OperationStatusSource,
    max_attempts: u32,
    unit: Duration,
    cancel: CancellationToken,
}

impl<'a> AsyncOperationPoller<'a> {
    pub fn new(source: &'a dyn OperationStatusSource) -> Self {
        Self {
            source,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            unit: DEFAULT_UNIT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Base unit of the backoff schedule.
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Delay before attempt `attempt` (0-indexed): `unit * 2^(attempt / 2)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt / 2).unwrap_or(u32::MAX);
        self.unit.saturating_mul(factor)
    }

    /// Wait until the operation reaches a terminal state.
    pub async fn poll(&self, handle: &OperationHandle) -> Result<(), BulkError> {
        for attempt in 0..self.max_attempts {
            let delay = self.backoff(attempt);
            trace!(operation_id = %handle, attempt, delay_ms = delay.as_millis() as u64, "Waiting before poll");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(BulkError::PollAborted { operation_id: handle.id.clone() });
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let status = self.source.operation_status(handle).await?;
            debug!(operation_id = %handle, attempt, status = %status, "Polled bulk operation");

            match status {
                OperationStatus::Pending | OperationStatus::Running => continue,
                OperationStatus::Completed => return Ok(()),
                OperationStatus::Failed(message) => {
                    return Err(BulkError::OperationFailed {
                        operation_id: handle.id.clone(),
                        message,
                    })
                }
                OperationStatus::Unknown(status) => {
                    return Err(BulkError::UnexpectedStatus {
                        operation_id: handle.id.clone(),
                        status,
                    })
                }
            }
        }

        Err(BulkError::StillRunning {
            operation_id: handle.id.clone(),
        })
    }
}
