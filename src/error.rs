//! Error types shared by the pipeline, its ports and adapters.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a remote collaborator (table store or object store).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rate limited by remote store")]
    RateLimited,
    #[error("remote call timed out")]
    Timeout,
    #[error("remote store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Rate-limit and timeout failures deserve one automatic retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::RateLimited | StoreError::Timeout)
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if let Some(status) = err.status() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                StoreError::RateLimited
            } else {
                StoreError::Status {
                    status: status.as_u16(),
                    body: err.to_string(),
                }
            }
        } else if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

/// Failure of the external transcoding tool.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with failure: {stderr}")]
    Failed { tool: &'static str, stderr: String },
    #[error("invalid output: {0}")]
    InvalidOutput(String),
}

/// Coarse classification used to decide how far a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transient,
    Permanent,
    LocalIo,
    DataShape,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid duration {duration}s for segment length {segment_length}s")]
    InvalidDuration { duration: f64, segment_length: f64 },
    #[error("record {record_id} has no source media reference")]
    MissingSourceReference { record_id: String },
    #[error("record {record_id} is malformed: {reason}")]
    DataShape { record_id: String, reason: String },
    #[error("source {source_ref} unavailable: {source}")]
    SourceUnavailable {
        source_ref: String,
        #[source]
        source: StoreError,
    },
    #[error("probing {path:?} failed: {source}")]
    ProbeFailed {
        path: PathBuf,
        #[source]
        source: TranscodeError,
    },
    #[error("segment {index} failed: {source}")]
    SegmentationFailed {
        index: usize,
        #[source]
        source: TranscodeError,
    },
    #[error("upload of {name} failed: {source}")]
    UploadFailed {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("could not remove {failed} entries under {dir:?}, first: {first:?}")]
    CleanupError {
        dir: PathBuf,
        failed: usize,
        first: PathBuf,
    },
    #[error("transient remote error: {0}")]
    TransientRemote(#[source] StoreError),
    #[error("remote error: {0}")]
    PermanentRemote(#[source] StoreError),
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },
    #[error("local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::TransientRemote(_) | PipelineError::Timeout { .. } => {
                ErrorCategory::Transient
            }
            PipelineError::UploadFailed { source, .. }
            | PipelineError::SourceUnavailable { source, .. }
                if source.is_transient() =>
            {
                ErrorCategory::Transient
            }
            PipelineError::CleanupError { .. } | PipelineError::LocalIo(_) => {
                ErrorCategory::LocalIo
            }
            PipelineError::MissingSourceReference { .. }
            | PipelineError::DataShape { .. }
            | PipelineError::InvalidDuration { .. } => ErrorCategory::DataShape,
            _ => ErrorCategory::Permanent,
        }
    }

    /// Wraps a remote failure into its transient or permanent variant.
    pub fn remote(err: StoreError) -> Self {
        if err.is_transient() {
            PipelineError::TransientRemote(err)
        } else {
            PipelineError::PermanentRemote(err)
        }
    }
}

/// Missing or unparsable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),
    #[error("environment variable {name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}
