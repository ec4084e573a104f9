//! Page Cursor
//!
//! Drives a paginated list endpoint until it is exhausted. Pages are fetched
//! strictly in order because each request depends on the previous response.

use async_trait::async_trait;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::error::{ApiError, FetchError};
use super::types::{Cursor, Page};

/// Page size used when the caller expects a very large collection
pub const MANY_ITEMS_PER_PAGE: u32 = 4;

/// A remote collection that can be listed one page at a time.
///
/// Implementations carry the query (zone, project, filters); the cursor only
/// carries the position.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    async fn list_page(&self, cursor: Cursor) -> Result<Page<Self::Item>, ApiError>;
}

/// Options for a full listing
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Page size; `None` uses the provider default
    pub per_page: Option<u32>,
    /// Use a small page size for collections the provider struggles to list
    pub many_items: bool,
}

impl ListOptions {
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn many_items(mut self, many_items: bool) -> Self {
        self.many_items = many_items;
        self
    }

    fn first_cursor(&self) -> Cursor {
        if self.many_items {
            Cursor::first(Some(MANY_ITEMS_PER_PAGE))
        } else {
            Cursor::first(self.per_page)
        }
    }
}

/// Fetch every item of a paginated collection.
///
/// A failure before the first page yields [`FetchError::Failed`]; a failure
/// after at least one page yields [`FetchError::Partial`] carrying what was
/// retrieved so the caller can decide whether that is usable.
pub async fn fetch_all<S>(
    source: &S,
    options: &ListOptions,
    cancel: &CancellationToken,
) -> Result<Vec<S::Item>, FetchError<S::Item>>
where
    S: PageSource + ?Sized,
{
    let started = Instant::now();
    let mut cursor = options.first_cursor();
    let mut items: Vec<S::Item> = Vec::new();
    let mut pages = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled { items });
        }

        trace!(page = cursor.page, per_page = ?cursor.per_page, "Fetching page");
        let page = match source.list_page(cursor).await {
            Ok(page) => page,
            Err(source) if pages == 0 => {
                warn!(error = %source, "Unable to fetch any items");
                return Err(FetchError::Failed(source));
            }
            Err(source) => {
                warn!(
                    error = %source,
                    fetched = items.len(),
                    "Error fetching more items, returning what we have"
                );
                return Err(FetchError::Partial { items, source });
            }
        };
        pages += 1;

        let last = page.is_last();
        let current = page.page;
        items.extend(page.items);

        if last {
            trace!(pages, total = items.len(), "Pagination exhausted");
            break;
        }
        // Never step backwards even if the remote echoes an older page
        cursor = Cursor {
            page: current.max(cursor.page),
            ..cursor
        }
        .next();
    }

    debug!(
        count = items.len(),
        pages,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Listing complete"
    );
    Ok(items)
}
