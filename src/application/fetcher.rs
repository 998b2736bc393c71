//! Cursor-driven retrieval of every record matching a filter.

use crate::domain::records::{PageCursor, RecordFilter, RecordPage, SourceRecord};
use crate::error::StoreError;
use crate::ports::table_store::TableStore;
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

enum PageState {
    First,
    Next { cursor: PageCursor, page: usize },
    Done,
}

pub struct RecordFetcher<T> {
    store: Arc<T>,
    table: String,
    rate_limit_backoff: Duration,
    retry_backoff: Duration,
    call_timeout: Duration,
}

impl<T> RecordFetcher<T>
where
    T: TableStore,
{
    pub fn new(
        store: Arc<T>,
        table: impl Into<String>,
        rate_limit_backoff: Duration,
        retry_backoff: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            rate_limit_backoff,
            retry_backoff,
            call_timeout,
        }
    }

    /// Lazily yields every record matching `filter`, page after page.
    ///
    /// Each call starts again from the first page. The next page is only
    /// requested once the previous one has been consumed. An unrecoverable
    /// page error ends the stream; records already yielded are unaffected.
    pub fn fetch_all<'a>(
        &'a self,
        filter: &'a RecordFilter,
    ) -> impl Stream<Item = SourceRecord> + Send + 'a {
        stream::unfold(PageState::First, move |state| async move {
            let (cursor, page) = match state {
                PageState::First => (None, 1),
                PageState::Next { cursor, page } => (Some(cursor), page),
                PageState::Done => return None,
            };

            let result = self.fetch_page(filter, cursor.clone(), page).await;
            let RecordPage { records, next } = match result {
                Ok(page) => page,
                Err(e) => {
                    error!(
                        table = %self.table,
                        page,
                        cursor = ?cursor,
                        error = %e,
                        "Aborting record fetch"
                    );
                    return None;
                }
            };

            info!(table = %self.table, page, records = records.len(), more = next.is_some(), "Fetched page");

            let state = match next {
                Some(cursor) => PageState::Next {
                    cursor,
                    page: page + 1,
                },
                None => PageState::Done,
            };
            Some((stream::iter(records), state))
        })
        .flatten()
    }

    async fn fetch_page(
        &self,
        filter: &RecordFilter,
        cursor: Option<PageCursor>,
        page: usize,
    ) -> Result<RecordPage, StoreError> {
        match self.list(filter, cursor.clone()).await {
            Err(StoreError::RateLimited) => {
                warn!(
                    page,
                    wait_secs = self.rate_limit_backoff.as_secs(),
                    "Table store returned 429, backing off"
                );
                tokio::time::sleep(self.rate_limit_backoff).await;
                self.list(filter, cursor).await
            }
            Err(StoreError::Timeout) => {
                warn!(page, "Page request timed out, retrying once");
                tokio::time::sleep(self.retry_backoff).await;
                self.list(filter, cursor).await
            }
            other => other,
        }
    }

    async fn list(
        &self,
        filter: &RecordFilter,
        cursor: Option<PageCursor>,
    ) -> Result<RecordPage, StoreError> {
        debug!(table = %self.table, cursor = ?cursor, "Requesting page");
        tokio::time::timeout(
            self.call_timeout,
            self.store.list_records(&self.table, filter, cursor),
        )
        .await
        .map_err(|_| StoreError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::records::{RecordPatch, SegmentRecord};
    use crate::ports::table_store::MockTableStore;
    use async_trait::async_trait;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(id: &str) -> SourceRecord {
        SourceRecord {
            id: id.to_string(),
            source: None,
            display_name: None,
            destination_folder: None,
            processed: false,
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> RecordPage {
        RecordPage {
            records: ids.iter().map(|id| record(id)).collect(),
            next: next.map(|c| PageCursor(c.to_string())),
        }
    }

    fn fetcher(store: MockTableStore) -> RecordFetcher<MockTableStore> {
        RecordFetcher::new(
            Arc::new(store),
            "tblSource",
            Duration::from_millis(1),
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
    }

    /// Table store whose page requests never return.
    #[derive(Default)]
    struct StalledPages {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TableStore for StalledPages {
        async fn list_records(
            &self,
            _table: &str,
            _filter: &RecordFilter,
            _cursor: Option<PageCursor>,
        ) -> Result<RecordPage, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            futures::future::pending().await
        }

        async fn create_records(
            &self,
            _table: &str,
            _rows: Vec<SegmentRecord>,
        ) -> Result<(), StoreError> {
            unreachable!()
        }

        async fn update_record(
            &self,
            _table: &str,
            _record_id: &str,
            _patch: RecordPatch,
        ) -> Result<(), StoreError> {
            unreachable!()
        }
    }

    fn filter() -> RecordFilter {
        RecordFilter::unprocessed("Video Processed", None)
    }

    async fn collect_ids(fetcher: &RecordFetcher<MockTableStore>) -> Vec<String> {
        let filter = filter();
        fetcher
            .fetch_all(&filter)
            .map(|r| r.id)
            .collect::<Vec<_>>()
            .await
    }

    #[tokio::test]
    async fn test_follows_cursors_until_last_page() {
        let mut store = MockTableStore::new();
        let mut seq = Sequence::new();
        store
            .expect_list_records()
            .with(eq("tblSource"), eq(filter()), eq(None::<PageCursor>))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(page(&["a", "b"], Some("c1"))));
        store
            .expect_list_records()
            .with(eq("tblSource"), eq(filter()), eq(Some(PageCursor("c1".into()))))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(page(&["c"], Some("c2"))));
        store
            .expect_list_records()
            .with(eq("tblSource"), eq(filter()), eq(Some(PageCursor("c2".into()))))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(page(&["d", "e"], None)));

        let ids = collect_ids(&fetcher(store)).await;

        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_empty_store_yields_nothing() {
        let mut store = MockTableStore::new();
        store
            .expect_list_records()
            .times(1)
            .returning(|_, _, _| Ok(page(&[], None)));

        assert!(collect_ids(&fetcher(store)).await.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_retries_same_page_once() {
        let mut store = MockTableStore::new();
        let mut seq = Sequence::new();
        store
            .expect_list_records()
            .with(eq("tblSource"), eq(filter()), eq(None::<PageCursor>))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(page(&["a"], Some("c1"))));
        store
            .expect_list_records()
            .with(eq("tblSource"), eq(filter()), eq(Some(PageCursor("c1".into()))))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(StoreError::RateLimited));
        store
            .expect_list_records()
            .with(eq("tblSource"), eq(filter()), eq(Some(PageCursor("c1".into()))))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(page(&["b"], Some("c2"))));
        store
            .expect_list_records()
            .with(eq("tblSource"), eq(filter()), eq(Some(PageCursor("c2".into()))))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(page(&["c"], None)));

        let ids = collect_ids(&fetcher(store)).await;

        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_second_rate_limit_aborts_fetch() {
        let mut store = MockTableStore::new();
        let mut seq = Sequence::new();
        store
            .expect_list_records()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(page(&["a"], Some("c1"))));
        store
            .expect_list_records()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(StoreError::RateLimited));

        let ids = collect_ids(&fetcher(store)).await;

        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_http_error_aborts_without_retry() {
        let mut store = MockTableStore::new();
        store.expect_list_records().times(1).returning(|_, _, _| {
            Err(StoreError::Status {
                status: 401,
                body: "unauthorized".into(),
            })
        });

        assert!(collect_ids(&fetcher(store)).await.is_empty());
    }

    #[tokio::test]
    async fn test_each_call_restarts_from_first_page() {
        let mut store = MockTableStore::new();
        store
            .expect_list_records()
            .with(eq("tblSource"), eq(filter()), eq(None::<PageCursor>))
            .times(2)
            .returning(|_, _, _| Ok(page(&["a"], None)));

        let fetcher = fetcher(store);
        assert_eq!(collect_ids(&fetcher).await, vec!["a"]);
        assert_eq!(collect_ids(&fetcher).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_timed_out_page_is_retried_once() {
        let mut store = MockTableStore::new();
        let mut seq = Sequence::new();
        store
            .expect_list_records()
            .with(eq("tblSource"), eq(filter()), eq(None::<PageCursor>))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(StoreError::Timeout));
        store
            .expect_list_records()
            .with(eq("tblSource"), eq(filter()), eq(None::<PageCursor>))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(page(&["a", "b"], None)));

        assert_eq!(collect_ids(&fetcher(store)).await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_stalled_page_times_out_after_one_retry() {
        let store = Arc::new(StalledPages::default());
        let fetcher = RecordFetcher::new(
            store.clone(),
            "tblSource",
            Duration::from_millis(1),
            Duration::from_millis(1),
            Duration::from_millis(50),
        );
        let filter = filter();

        let err = fetcher.fetch_page(&filter, None, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout));
        assert!(err.is_transient());
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);

        let ids: Vec<String> = fetcher.fetch_all(&filter).map(|r| r.id).collect().await;
        assert!(ids.is_empty());
        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
    }
}
