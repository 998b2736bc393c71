use crate::domain::records::{PageCursor, RecordFilter, RecordPage, RecordPatch, SegmentRecord};
use crate::error::StoreError;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TableStore: Send + Sync {
    /// List one page of records matching `filter`.
    /// `cursor`: `None` for the first page, otherwise the previous page's `next`.
    /// A rate-limited call must surface as `StoreError::RateLimited`.
    async fn list_records(
        &self,
        table: &str,
        filter: &RecordFilter,
        cursor: Option<PageCursor>,
    ) -> Result<RecordPage, StoreError>;

    /// Append rows to a table
    async fn create_records(
        &self,
        table: &str,
        rows: Vec<SegmentRecord>,
    ) -> Result<(), StoreError>;

    /// Apply field changes to a single record
    async fn update_record(
        &self,
        table: &str,
        record_id: &str,
        patch: RecordPatch,
    ) -> Result<(), StoreError>;
}
