use crate::error::TranscodeError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Duration of the media file in seconds
    async fn probe_duration(&self, path: &Path) -> Result<f64, TranscodeError>;

    /// Cut `length` seconds starting at `start` out of `source` into `output`.
    /// The tool clamps the cut to the end of the media.
    async fn extract_segment(
        &self,
        source: &Path,
        start: f64,
        length: f64,
        output: &Path,
    ) -> Result<PathBuf, TranscodeError>;
}
