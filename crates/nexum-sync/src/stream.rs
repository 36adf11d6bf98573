//! Resource streams: the per-resource-type unit of sync work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use nexum_connector::error::ConnectorResult;
use nexum_connector::ids::OperationKey;

/// One record fetched from a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    /// Provider-side identifier.
    pub id: String,
    /// When the record last changed, as reported by the provider. Records
    /// without a modification time are never skipped by the cursor.
    pub modified_at: Option<DateTime<Utc>>,
    /// Record payload.
    pub data: serde_json::Value,
}

impl ResourceRecord {
    /// Create a record without a modification time.
    #[must_use]
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            modified_at: None,
            data,
        }
    }

    /// Attach the provider-reported modification time.
    #[must_use]
    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }
}

/// One fetched page of records plus the cursor for the next page.
#[derive(Debug, Clone, Default)]
pub struct ResourcePage {
    /// Records in this page.
    pub records: Vec<ResourceRecord>,
    /// Opaque cursor for the next page; `None` on the final page.
    pub next_page: Option<String>,
}

impl ResourcePage {
    /// Create a final page.
    #[must_use]
    pub fn new(records: Vec<ResourceRecord>) -> Self {
        Self {
            records,
            next_page: None,
        }
    }

    /// Attach the cursor of the following page.
    #[must_use]
    pub fn with_next_page(mut self, next_page: impl Into<String>) -> Self {
        self.next_page = Some(next_page.into());
        self
    }
}

/// A paginated stream of one resource type from one provider.
///
/// The orchestrator drives `fetch_page` until the page cursor runs out and
/// feeds each record through `apply`. Streams of the same pass run
/// concurrently and fail independently.
#[async_trait]
pub trait ResourceStream: Send + Sync {
    /// Resource type this stream carries (`contacts`, `deals`).
    fn resource_type(&self) -> &str;

    /// Operation key for governor admission, conventionally
    /// `sync.{resource_type}`.
    fn operation_key(&self) -> OperationKey;

    /// Fetch one page of records. `cursor` is `None` for the first page,
    /// otherwise the `next_page` value of the previous one.
    async fn fetch_page(&self, cursor: Option<&str>) -> ConnectorResult<ResourcePage>;

    /// Apply one fetched record to the local side.
    async fn apply(&self, record: &ResourceRecord) -> ConnectorResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_builder() {
        let now = Utc::now();
        let record = ResourceRecord::new("c-1", json!({"name": "Ada"})).with_modified_at(now);

        assert_eq!(record.id, "c-1");
        assert_eq!(record.modified_at, Some(now));
    }

    #[test]
    fn test_page_cursor_chain() {
        let page = ResourcePage::new(vec![]).with_next_page("page-2");
        assert_eq!(page.next_page.as_deref(), Some("page-2"));

        let last = ResourcePage::new(vec![]);
        assert!(last.next_page.is_none());
    }
}
