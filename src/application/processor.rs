//! End-to-end handling of a single source record.

use super::retry::retry_transient_once;
use super::scratch::ScratchSpace;
use super::transfer::MediaTransfer;
use crate::config::{ObjectStoreConfig, PipelineConfig, TableStoreConfig};
use crate::domain::plan::plan;
use crate::domain::records::{RecordPatch, SegmentRecord, SourceRecord};
use crate::domain::segments::SegmentFile;
use crate::error::{PipelineError, StoreError};
use crate::ports::object_store::ObjectStore;
use crate::ports::table_store::TableStore;
use crate::ports::transcoder::Transcoder;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Static inputs of every job, taken from the application config.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub source_table: String,
    pub destination_table: String,
    /// Upload folder for records that do not name one
    pub default_folder: String,
    pub segment_length: f64,
    pub segment_extension: String,
    pub retry_backoff: Duration,
    pub call_timeout: Duration,
}

impl ProcessorSettings {
    pub fn from_config(
        table: &TableStoreConfig,
        objects: &ObjectStoreConfig,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self {
            source_table: table.source_table.clone(),
            destination_table: table.destination_table.clone(),
            default_folder: objects.default_folder.clone(),
            segment_length: pipeline.segment_length_secs,
            segment_extension: pipeline.segment_extension.clone(),
            retry_backoff: pipeline.retry_backoff,
            call_timeout: pipeline.call_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Segments uploaded and recorded in the destination table
    pub segments: usize,
    /// False when the final flag update failed; the record will be redone
    pub marked_processed: bool,
}

pub struct RecordProcessor<T, S, X> {
    tables: Arc<T>,
    transfer: MediaTransfer<S>,
    transcoder: Arc<X>,
    scratch: ScratchSpace,
    settings: ProcessorSettings,
}

impl<T, S, X> RecordProcessor<T, S, X>
where
    T: TableStore,
    S: ObjectStore,
    X: Transcoder,
{
    pub fn new(
        tables: Arc<T>,
        objects: Arc<S>,
        transcoder: Arc<X>,
        scratch: ScratchSpace,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            tables,
            transfer: MediaTransfer::new(objects, settings.retry_backoff, settings.call_timeout),
            transcoder,
            scratch,
            settings,
        }
    }

    /// Download, split, upload and record one source video, then flag it.
    ///
    /// Local files created by the job are gone when this returns, except
    /// when their removal itself fails; the next run's sweep covers those.
    pub async fn process(&self, record: SourceRecord) -> Result<ProcessOutcome, PipelineError> {
        let span = info_span!("record", record_id = %record.id);
        self.run(record).instrument(span).await
    }

    async fn run(&self, record: SourceRecord) -> Result<ProcessOutcome, PipelineError> {
        let source = record
            .source
            .clone()
            .ok_or_else(|| PipelineError::MissingSourceReference {
                record_id: record.id.clone(),
            })?;
        let folder = record
            .destination_folder
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(&self.settings.default_folder);

        let source_path = self
            .scratch
            .source_path(&record.id, &self.settings.segment_extension);
        info!(source = %source, name = ?record.display_name, "Downloading source video");
        self.transfer.fetch(&source, &source_path).await?;

        let segments = match self.split(&record.id, &source_path).await {
            Ok(segments) => segments,
            Err(e) => {
                self.scratch.discard(&source_path).await;
                return Err(e);
            }
        };
        self.scratch.discard(&source_path).await;

        for (position, segment) in segments.iter().enumerate() {
            if let Err(e) = self.publish(&record.id, segment, folder).await {
                for pending in &segments[position..] {
                    self.scratch.discard(&pending.path).await;
                }
                return Err(e);
            }
        }

        let marked_processed = self.mark_processed(&record.id).await;
        info!(segments = segments.len(), marked_processed, "Record done");
        Ok(ProcessOutcome {
            segments: segments.len(),
            marked_processed,
        })
    }

    /// Probes the source and materialises every planned segment.
    async fn split(
        &self,
        record_id: &str,
        source_path: &Path,
    ) -> Result<Vec<SegmentFile>, PipelineError> {
        let duration = self
            .bounded("probe", self.transcoder.probe_duration(source_path))
            .await?
            .map_err(|source| PipelineError::ProbeFailed {
                path: source_path.to_path_buf(),
                source,
            })?;
        let plan = plan(duration, self.settings.segment_length)?;
        info!(duration, segments = plan.len(), "Segment plan computed");

        let mut produced: Vec<SegmentFile> = Vec::with_capacity(plan.len());
        for planned in &plan {
            let mut file = SegmentFile::planned(
                self.scratch.root(),
                record_id,
                &self.settings.segment_extension,
                planned,
            );
            let extracted = self
                .bounded(
                    "extract",
                    self.transcoder.extract_segment(
                        source_path,
                        planned.start,
                        planned.length,
                        &file.path,
                    ),
                )
                .await
                .and_then(|result| {
                    result.map_err(|source| PipelineError::SegmentationFailed {
                        index: planned.index,
                        source,
                    })
                });

            match extracted {
                Ok(path) => {
                    debug!(segment = planned.index, start = planned.start, length = planned.length, path = ?path, "Segment extracted");
                    file.path = path;
                    produced.push(file);
                }
                Err(e) => {
                    error!(segment = planned.index, error = %e, "Segmentation failed");
                    self.scratch.discard(&file.path).await;
                    for done in &produced {
                        self.scratch.discard(&done.path).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(produced)
    }

    /// Upload, append the destination row, then drop the local copy.
    async fn publish(
        &self,
        record_id: &str,
        segment: &SegmentFile,
        folder: &str,
    ) -> Result<(), PipelineError> {
        let url = self
            .transfer
            .upload(&segment.path, &segment.name, folder)
            .await?;
        debug!(segment = segment.index, url = %url, "Segment uploaded");

        let row = SegmentRecord {
            name: segment.name.clone(),
            url,
            source_record_id: record_id.to_string(),
        };
        let table = self.settings.destination_table.as_str();
        let call_timeout = self.settings.call_timeout;
        retry_transient_once("create segment record", self.settings.retry_backoff, move || {
            let row = row.clone();
            async move {
                tokio::time::timeout(call_timeout, self.tables.create_records(table, vec![row]))
                    .await
                    .map_err(|_| StoreError::Timeout)?
            }
        })
        .await
        .map_err(PipelineError::remote)?;

        self.scratch.discard(&segment.path).await;
        info!(segment = segment.index, name = %segment.name, "Segment published");
        Ok(())
    }

    async fn mark_processed(&self, record_id: &str) -> bool {
        let table = self.settings.source_table.as_str();
        let call_timeout = self.settings.call_timeout;
        let result = retry_transient_once("mark processed", self.settings.retry_backoff, move || async move {
            tokio::time::timeout(
                call_timeout,
                self.tables
                    .update_record(table, record_id, RecordPatch::mark_processed()),
            )
            .await
            .map_err(|_| StoreError::Timeout)?
        })
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to mark record processed, it will be redone on the next run");
                false
            }
        }
    }

    async fn bounded<F>(&self, operation: &str, fut: F) -> Result<F::Output, PipelineError>
    where
        F: Future,
    {
        tokio::time::timeout(self.settings.call_timeout, fut)
            .await
            .map_err(|_| PipelineError::Timeout {
                operation: operation.to_string(),
                secs: self.settings.call_timeout.as_secs(),
            })
    }
}
