//! Bulk resource-operations engine
//!
//! Listing, permission checks, bounded concurrent mutation and async
//! operation polling. Remote calls go through the traits defined here; the
//! gate checks [`crate::cloudflare::Capability`] against a
//! [`crate::cloudflare::Credential`].

pub mod batch;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod pagination;
pub mod poller;
pub mod types;

pub use batch::{BatchOutcome, BoundedBatchExecutor, DEFAULT_CONCURRENCY};
pub use error::{ApiError, BulkError, FetchError, RemoteMessage};
pub use gate::{CapabilityGate, GateOutcome, TokenIntrospector, TokenPolicy, TokenStatus};
pub use orchestrator::{
    Orchestrator, PurgeConfirmation, RunOptions, RunOutcome, RunSummary, Selection,
};
pub use pagination::{fetch_all, ListOptions, PageSource, MANY_ITEMS_PER_PAGE};
pub use poller::{AsyncOperationPoller, BulkMutationStarter, OperationStatusSource};
pub use types::{Cursor, OperationHandle, OperationStatus, Page, Resource};
