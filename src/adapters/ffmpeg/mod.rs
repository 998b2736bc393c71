//! Transcoder backed by the ffmpeg and ffprobe binaries.

pub mod cmd;

use crate::error::TranscodeError;
use crate::ports::transcoder::Transcoder;
use async_trait::async_trait;
use cmd::TranscodeExecutor;
use std::path::{Path, PathBuf};
use std::process::Output;
use tracing::debug;

pub struct FfmpegTranscoder<E> {
    runner: E,
}

impl<E: TranscodeExecutor> FfmpegTranscoder<E> {
    pub fn new(runner: E) -> Self {
        Self { runner }
    }
}

fn check(tool: &'static str, output: Output) -> Result<Output, TranscodeError> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(TranscodeError::Failed {
            tool,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Parses the single number ffprobe prints for `format=duration`.
fn parse_duration(stdout: &[u8]) -> Result<f64, TranscodeError> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    match text.parse::<f64>() {
        Ok(duration) if duration.is_finite() && duration > 0.0 => Ok(duration),
        _ => Err(TranscodeError::InvalidOutput(format!(
            "expected a positive duration, got {:?}",
            text
        ))),
    }
}

#[async_trait]
impl<E: TranscodeExecutor> Transcoder for FfmpegTranscoder<E> {
    async fn probe_duration(&self, path: &Path) -> Result<f64, TranscodeError> {
        let output = self
            .runner
            .run_ffprobe_for_duration(path)
            .await
            .map_err(|source| TranscodeError::Spawn {
                tool: "ffprobe",
                source,
            })?;
        let output = check("ffprobe", output)?;
        parse_duration(&output.stdout)
    }

    async fn extract_segment(
        &self,
        source: &Path,
        start: f64,
        length: f64,
        output: &Path,
    ) -> Result<PathBuf, TranscodeError> {
        let start_at = start.to_string();
        let duration = length.to_string();
        debug!(source = ?source, start = %start_at, duration = %duration, "Running ffmpeg");

        let result = self
            .runner
            .run_ffmpeg_cut(source, &start_at, &duration, output)
            .await
            .map_err(|source| TranscodeError::Spawn {
                tool: "ffmpeg",
                source,
            })?;
        check("ffmpeg", result)?;

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(TranscodeError::InvalidOutput(format!(
                "ffmpeg reported success but {:?} was not written",
                output
            )));
        }
        Ok(output.to_path_buf())
    }
}
