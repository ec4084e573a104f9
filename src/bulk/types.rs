//! Bulk Engine Types
//!
//! Value types shared by the pagination, batch and polling components.

/// An item addressable by a stable identifier.
///
/// The engine never looks at anything but the id: it keys outcomes by it and
/// hands the whole item back to the mutation closure.
pub trait Resource {
    fn id(&self) -> &str;
}

impl Resource for String {
    fn id(&self) -> &str {
        self
    }
}

/// Position of the next list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// 1-based page number
    pub page: u32,
    /// Page size; `None` leaves it to the provider default
    pub per_page: Option<u32>,
}

impl Cursor {
    pub fn first(per_page: Option<u32>) -> Self {
        Self { page: 1, per_page }
    }

    pub fn next(self) -> Self {
        Self {
            page: self.page + 1,
            per_page: self.per_page,
        }
    }
}

/// One response unit from a list endpoint
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub total_pages: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    /// Whether no further page should be requested after this one.
    pub fn is_last(&self) -> bool {
        self.items.is_empty() || self.page >= self.total_pages
    }
}

/// Handle of a server-side asynchronous bulk mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub id: String,
}

impl OperationHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl std::fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Status of an asynchronous bulk mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed(String),
    /// Anything outside the known enumeration, kept verbatim
    Unknown(String),
}

impl OperationStatus {
    /// Build a status from the wire representation.
    pub fn from_wire(status: &str, error: Option<String>) -> Self {
        match status {
            "pending" => OperationStatus::Pending,
            "running" => OperationStatus::Running,
            "completed" => OperationStatus::Completed,
            "failed" => OperationStatus::Failed(error.unwrap_or_default()),
            other => OperationStatus::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "pending"),
            OperationStatus::Running => write!(f, "running"),
            OperationStatus::Completed => write!(f, "completed"),
            OperationStatus::Failed(_) => write!(f, "failed"),
            OperationStatus::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_is_last() {
        let mid = Page { items: vec![1, 2], page: 1, total_pages: 3, per_page: 2 };
        assert!(!mid.is_last());

        let last = Page { items: vec![1], page: 3, total_pages: 3, per_page: 2 };
        assert!(last.is_last());

        let empty: Page<u8> = Page { items: vec![], page: 2, total_pages: 5, per_page: 2 };
        assert!(empty.is_last());
    }

    #[test]
    fn test_operation_status_from_wire() {
        assert_eq!(OperationStatus::from_wire("pending", None), OperationStatus::Pending);
        assert_eq!(
            OperationStatus::from_wire("failed", Some("quota exceeded".to_string())),
            OperationStatus::Failed("quota exceeded".to_string())
        );
        assert_eq!(
            OperationStatus::from_wire("paused", None),
            OperationStatus::Unknown("paused".to_string())
        );
    }
}
