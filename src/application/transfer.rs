//! Moves media between the object store and local scratch space.

use super::retry::retry_transient_once;
use crate::domain::records::SourceRef;
use crate::error::{PipelineError, StoreError};
use crate::ports::object_store::ObjectStore;
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::{fs::File, io::BufWriter};
use tokio_util::io::StreamReader;
use tracing::{info, warn};

const DOWNLOAD_ATTEMPTS: u32 = 2;

pub struct MediaTransfer<S> {
    store: Arc<S>,
    retry_backoff: Duration,
    call_timeout: Duration,
}

impl<S> Clone for MediaTransfer<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            retry_backoff: self.retry_backoff,
            call_timeout: self.call_timeout,
        }
    }
}

impl<S> MediaTransfer<S>
where
    S: ObjectStore,
{
    pub fn new(store: Arc<S>, retry_backoff: Duration, call_timeout: Duration) -> Self {
        Self {
            store,
            retry_backoff,
            call_timeout,
        }
    }

    /// Downloads `source` to `local_path`, retrying once on any failure.
    ///
    /// A failed attempt may leave a partial file behind; it is removed
    /// before the retry and again before giving up.
    pub async fn fetch(&self, source: &SourceRef, local_path: &Path) -> Result<(), PipelineError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(source, local_path).await {
                Ok(bytes) => {
                    info!(source = %source, path = ?local_path, bytes, "Source downloaded");
                    return Ok(());
                }
                Err(e) => {
                    warn!(source = %source, attempt, error = %e, "Download failed");
                    if let Err(e) = tokio::fs::remove_file(local_path).await {
                        if e.kind() != io::ErrorKind::NotFound {
                            warn!(path = ?local_path, error = %e, "Failed to delete partial download");
                        }
                    }
                    if attempt == DOWNLOAD_ATTEMPTS {
                        return Err(PipelineError::SourceUnavailable {
                            source_ref: source.to_string(),
                            source: e,
                        });
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn fetch_once(&self, source: &SourceRef, local_path: &Path) -> Result<u64, StoreError> {
        let download = async {
            let stream = self.store.download(source).await?;
            match stream_to_file(local_path, stream).await {
                Ok(written) => Ok(written),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(StoreError::Timeout),
                Err(e) => Err(StoreError::Io(e)),
            }
        };
        tokio::time::timeout(self.call_timeout, download)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    /// Uploads a produced segment under its stable name and returns its URL.
    pub async fn upload(
        &self,
        local_path: &Path,
        name: &str,
        folder: &str,
    ) -> Result<String, PipelineError> {
        let call_timeout = self.call_timeout;
        retry_transient_once("upload", self.retry_backoff, || async move {
            tokio::time::timeout(call_timeout, self.store.upload(local_path, name, folder))
                .await
                .map_err(|_| StoreError::Timeout)?
        })
        .await
        .map_err(|source| PipelineError::UploadFailed {
            name: name.to_string(),
            source,
        })
    }
}

/// Save a `Stream` to a file, returning the number of bytes written.
pub(crate) async fn stream_to_file<S>(path: &Path, stream: S) -> io::Result<u64>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let body_reader = StreamReader::new(stream);
    futures::pin_mut!(body_reader);

    let mut file = BufWriter::new(File::create(path).await?);
    let written = tokio::io::copy(&mut body_reader, &mut file).await?;
    file.flush().await?;

    Ok(written)
}
