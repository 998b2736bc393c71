//! One pipeline run: sweep scratch space, fetch pending records, process them.

use super::dispatcher::JobDispatcher;
use super::fetcher::RecordFetcher;
use super::processor::{ProcessorSettings, RecordProcessor};
use super::scratch::ScratchSpace;
use crate::config::AppConfig;
use crate::domain::records::RecordFilter;
use crate::ports::object_store::ObjectStore;
use crate::ports::table_store::TableStore;
use crate::ports::transcoder::Transcoder;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

/// Totals of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: usize,
    pub dispatched: usize,
    pub rejected: Vec<String>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Result of asking for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Started,
    AlreadyRunning,
}

/// Something that can start a run in the background.
pub trait RunTrigger: Send + Sync + 'static {
    fn trigger(self: Arc<Self>) -> Trigger;
}

/// Held for the whole duration of a run. Only one exists at a time.
pub struct RunPermit {
    _guard: OwnedMutexGuard<()>,
}

pub struct Pipeline<T, S, X> {
    fetcher: RecordFetcher<T>,
    dispatcher: JobDispatcher,
    processor: Arc<RecordProcessor<T, S, X>>,
    scratch: ScratchSpace,
    filter: RecordFilter,
    running: Arc<Mutex<()>>,
}

impl<T, S, X> Pipeline<T, S, X>
where
    T: TableStore + 'static,
    S: ObjectStore + 'static,
    X: Transcoder + 'static,
{
    pub fn new(
        fetcher: RecordFetcher<T>,
        dispatcher: JobDispatcher,
        processor: RecordProcessor<T, S, X>,
        scratch: ScratchSpace,
        filter: RecordFilter,
    ) -> Self {
        Self {
            fetcher,
            dispatcher,
            processor: Arc::new(processor),
            scratch,
            filter,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Wires every stage from the application config.
    pub fn from_config(
        config: &AppConfig,
        tables: Arc<T>,
        objects: Arc<S>,
        transcoder: Arc<X>,
    ) -> Self {
        let pipeline = &config.pipeline;
        let scratch = ScratchSpace::new(&pipeline.scratch_dir);
        let fetcher = RecordFetcher::new(
            tables.clone(),
            config.table.source_table.clone(),
            pipeline.rate_limit_backoff,
            pipeline.retry_backoff,
            pipeline.call_timeout,
        );
        let processor = RecordProcessor::new(
            tables,
            objects,
            transcoder,
            scratch.clone(),
            ProcessorSettings::from_config(&config.table, &config.objects, pipeline),
        );
        let filter =
            RecordFilter::unprocessed(&config.table.fields.processed, config.table.view.clone());

        Self::new(
            fetcher,
            JobDispatcher::new(pipeline.workers, pipeline.queue_capacity),
            processor,
            scratch,
            filter,
        )
    }

    /// Reserves the right to run, or `None` while another run is in flight.
    pub fn try_begin(&self) -> Option<RunPermit> {
        self.running
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| RunPermit { _guard: guard })
    }

    /// Waits for any in-flight run, then runs.
    pub async fn run(&self) -> RunReport {
        let permit = RunPermit {
            _guard: self.running.clone().lock_owned().await,
        };
        self.run_with(permit).await
    }

    pub async fn run_with(&self, _permit: RunPermit) -> RunReport {
        info!(dir = ?self.scratch.root(), "Pipeline run started");

        if let Err(e) = self.scratch.ensure().await {
            error!(error = %e, "Scratch directory unavailable, run aborted");
            return RunReport::default();
        }
        match self.scratch.clear().await {
            Ok(removed) if removed > 0 => info!(removed, "Stale scratch entries removed"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Scratch sweep incomplete, continuing"),
        }

        let mut fetched = 0;
        let records = self
            .fetcher
            .fetch_all(&self.filter)
            .inspect(|_| fetched += 1);

        let processor = self.processor.clone();
        let dispatch = self
            .dispatcher
            .dispatch_all(records, move |record| {
                let processor = processor.clone();
                async move { processor.process(record).await.map(|_| ()) }
            })
            .await;

        let report = RunReport {
            fetched,
            dispatched: dispatch.dispatched,
            rejected: dispatch.rejected,
            succeeded: dispatch.succeeded,
            failed: dispatch.failed,
        };
        info!(
            fetched = report.fetched,
            dispatched = report.dispatched,
            rejected = report.rejected.len(),
            succeeded = report.succeeded,
            failed = report.failed,
            "Pipeline run finished"
        );
        report
    }
}

impl<T, S, X> RunTrigger for Pipeline<T, S, X>
where
    T: TableStore + 'static,
    S: ObjectStore + 'static,
    X: Transcoder + 'static,
{
    fn trigger(self: Arc<Self>) -> Trigger {
        match self.try_begin() {
            Some(permit) => {
                tokio::spawn(async move {
                    self.run_with(permit).await;
                });
                Trigger::Started
            }
            None => Trigger::AlreadyRunning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::records::{RecordPage, SourceRecord, SourceRef};
    use crate::ports::object_store::MockObjectStore;
    use crate::ports::table_store::MockTableStore;
    use crate::ports::transcoder::MockTranscoder;
    use bytes::Bytes;
    use futures::stream;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn source_record(id: &str, source: Option<&str>) -> SourceRecord {
        SourceRecord {
            id: id.into(),
            source: source.and_then(SourceRef::parse),
            display_name: None,
            destination_folder: Some("folderA".into()),
            processed: false,
        }
    }

    fn settings() -> ProcessorSettings {
        ProcessorSettings {
            source_table: "tblSource".into(),
            destination_table: "tblSegments".into(),
            default_folder: "defaultFolder".into(),
            segment_length: 60.0,
            segment_extension: "mp4".into(),
            retry_backoff: Duration::ZERO,
            call_timeout: Duration::from_secs(5),
        }
    }

    fn pipeline(
        dir: &TempDir,
        tables: MockTableStore,
    ) -> Pipeline<MockTableStore, MockObjectStore, MockTranscoder> {
        let tables = Arc::new(tables);
        let mut objects = MockObjectStore::new();
        objects.expect_download().returning(|_| {
            Ok(Box::pin(stream::iter(vec![Ok::<_, std::io::Error>(
                Bytes::from_static(b"video"),
            )])))
        });
        objects
            .expect_upload()
            .returning(|_, name, _| Ok(format!("https://files.example/{}", name)));
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_probe_duration().returning(|_| Ok(61.0));
        transcoder
            .expect_extract_segment()
            .returning(|_, _, _, output| {
                std::fs::write(output, b"segment").unwrap();
                Ok(output.to_path_buf())
            });

        let scratch = ScratchSpace::new(dir.path().join("ProcessedVideos"));
        Pipeline::new(
            RecordFetcher::new(
                tables.clone(),
                "tblSource",
                Duration::ZERO,
                Duration::ZERO,
                Duration::from_secs(5),
            ),
            JobDispatcher::new(2, 4),
            RecordProcessor::new(
                tables,
                Arc::new(objects),
                Arc::new(transcoder),
                scratch.clone(),
                settings(),
            ),
            scratch,
            RecordFilter::unprocessed("Video Processed", None),
        )
    }

    #[tokio::test]
    async fn test_empty_store_runs_no_jobs() {
        let dir = tempdir().unwrap();
        let mut tables = MockTableStore::new();
        tables
            .expect_list_records()
            .times(1)
            .returning(|_, _, _| Ok(RecordPage::default()));
        tables.expect_create_records().never();

        let report = pipeline(&dir, tables).run().await;

        assert_eq!(report, RunReport::default());
        assert!(dir.path().join("ProcessedVideos").is_dir());
    }

    #[tokio::test]
    async fn test_run_sweeps_stale_files_and_reports_outcomes() {
        let dir = tempdir().unwrap();
        let scratch_dir = dir.path().join("ProcessedVideos");
        std::fs::create_dir_all(&scratch_dir).unwrap();
        std::fs::write(scratch_dir.join("recOld_004.mp4"), "orphan").unwrap();

        let mut tables = MockTableStore::new();
        tables.expect_list_records().times(1).returning(|_, _, _| {
            Ok(RecordPage {
                records: vec![
                    source_record("rec1", Some("https://drive.google.com/file/d/abc/view")),
                    source_record("rec2", None),
                ],
                next: None,
            })
        });
        tables
            .expect_create_records()
            .times(2)
            .returning(|_, _| Ok(()));
        tables
            .expect_update_record()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let report = pipeline(&dir, tables).run().await;

        assert_eq!(report.fetched, 2);
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(std::fs::read_dir(&scratch_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_second_trigger_during_run_is_refused() {
        let dir = tempdir().unwrap();
        let pipeline = Arc::new(pipeline(&dir, MockTableStore::new()));

        let permit = pipeline.try_begin().unwrap();
        assert_eq!(pipeline.clone().trigger(), Trigger::AlreadyRunning);
        drop(permit);

        assert!(pipeline.try_begin().is_some());
    }
}
