//! Errors raised by the bulk engine and its remote collaborators.

use thiserror::Error;

use crate::cloudflare::permissions::{describe, Capability};

/// Remote error code returned when a token may not read its own details
pub const SELF_INTROSPECTION_DENIED_CODE: i64 = 9109;
const SELF_INTROSPECTION_DENIED_MESSAGE: &str = "Unauthorized to access requested resource";

/// One `{code, message}` entry of a remote error response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessage {
    pub code: i64,
    pub message: String,
}

impl std::fmt::Display for RemoteMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Transport or remote failure of a single API call
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("{}", render_remote(.status, .errors))]
    Remote {
        status: u16,
        errors: Vec<RemoteMessage>,
    },

    #[error("invalid response: {0}")]
    Decode(String),
}

fn render_remote(status: &u16, errors: &[RemoteMessage]) -> String {
    if errors.is_empty() {
        return format!("remote returned HTTP {}", status);
    }
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ApiError {
    /// Remote error with a single message.
    pub fn remote(status: u16, code: i64, message: impl Into<String>) -> Self {
        ApiError::Remote {
            status,
            errors: vec![RemoteMessage {
                code,
                message: message.into(),
            }],
        }
    }

    /// Whether the credential was refused the right to read its own policies.
    pub fn is_self_introspection_denied(&self) -> bool {
        match self {
            ApiError::Remote { errors, .. } => errors.iter().any(|e| {
                e.code == SELF_INTROSPECTION_DENIED_CODE
                    || e.message.contains(SELF_INTROSPECTION_DENIED_MESSAGE)
            }),
            _ => false,
        }
    }
}

/// A listing that did not run to exhaustion
#[derive(Debug, Error)]
pub enum FetchError<T> {
    /// Nothing was retrieved
    #[error("listing failed: {0}")]
    Failed(#[source] ApiError),

    /// Some pages were retrieved before a later page failed
    #[error("listing stopped after {} items: {source}", .items.len())]
    Partial { items: Vec<T>, source: ApiError },

    #[error("listing cancelled after {} items", .items.len())]
    Cancelled { items: Vec<T> },
}

impl<T> FetchError<T> {
    /// Split into whatever was retrieved and the error that stopped the listing.
    pub fn into_parts(self) -> (Vec<T>, BulkError) {
        match self {
            FetchError::Failed(source) => (Vec::new(), BulkError::Api(source)),
            FetchError::Partial { items, source } => {
                let fetched = items.len();
                (items, BulkError::IncompleteListing { fetched, source })
            }
            FetchError::Cancelled { items } => {
                let fetched = items.len();
                (items, BulkError::ListingCancelled { fetched })
            }
        }
    }
}

impl<T> From<FetchError<T>> for BulkError {
    fn from(err: FetchError<T>) -> Self {
        err.into_parts().1
    }
}

/// Errors that can occur while running a bulk operation
#[derive(Debug, Error)]
pub enum BulkError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Exhaustive operations refuse to act on partial listings
    #[error("listing incomplete after {fetched} items: {source}")]
    IncompleteListing {
        fetched: usize,
        #[source]
        source: ApiError,
    },

    #[error("listing cancelled after {fetched} items")]
    ListingCancelled { fetched: usize },

    #[error("cancelled before the permission check finished")]
    CheckCancelled,

    #[error("API token is not active (status: {status})")]
    CredentialInactive { status: String },

    #[error("API token does not have permission {}", describe(.required))]
    InsufficientCapability { required: Vec<Capability> },

    #[error("bulk operation {operation_id} failed: {message}")]
    OperationFailed {
        operation_id: String,
        message: String,
    },

    #[error("bulk operation returned an unexpected status: {status}")]
    UnexpectedStatus {
        operation_id: String,
        status: String,
    },

    #[error("bulk operation {operation_id} did not finish before timeout, it may still complete; check back later")]
    StillRunning { operation_id: String },

    #[error("bulk operation {operation_id} aborted during backoff")]
    PollAborted { operation_id: String },

    #[error("failed to process {failed} of {selected} items")]
    BatchFailed { selected: usize, failed: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = ApiError::remote(400, 10001, "Unable to authenticate request");
        assert_eq!(err.to_string(), "Unable to authenticate request (10001)");

        let bare = ApiError::Remote { status: 502, errors: vec![] };
        assert_eq!(bare.to_string(), "remote returned HTTP 502");
    }

    #[test]
    fn test_self_introspection_denied_detection() {
        assert!(ApiError::remote(403, 9109, "Unauthorized to access requested resource")
            .is_self_introspection_denied());
        assert!(ApiError::remote(403, 1000, "Unauthorized to access requested resource")
            .is_self_introspection_denied());
        assert!(!ApiError::remote(403, 10000, "Authentication error").is_self_introspection_denied());
        assert!(!ApiError::Transport("timeout".to_string()).is_self_introspection_denied());
    }

    #[test]
    fn test_partial_fetch_converts_to_incomplete_listing() {
        let err = FetchError::Partial {
            items: vec!["a".to_string(), "b".to_string()],
            source: ApiError::Transport("connection reset".to_string()),
        };
        assert_eq!(err.to_string(), "listing stopped after 2 items: request failed: connection reset");

        let (items, bulk) = err.into_parts();
        assert_eq!(items.len(), 2);
        assert!(matches!(bulk, BulkError::IncompleteListing { fetched: 2, .. }));
    }

    #[test]
    fn test_fetch_error_exposes_source() {
        use std::error::Error as _;

        let failed: FetchError<String> = FetchError::Failed(ApiError::Transport("timeout".to_string()));
        assert_eq!(failed.to_string(), "listing failed: request failed: timeout");
        assert!(failed.source().is_some());

        let cancelled: FetchError<u32> = FetchError::Cancelled { items: vec![1, 2, 3] };
        assert_eq!(cancelled.to_string(), "listing cancelled after 3 items");
        assert!(cancelled.source().is_none());
    }

    #[test]
    fn test_insufficient_capability_names_requirement() {
        let err = BulkError::InsufficientCapability {
            required: vec![Capability::PagesWrite],
        };
        assert_eq!(err.to_string(), "API token does not have permission Pages:Edit");
    }
}
