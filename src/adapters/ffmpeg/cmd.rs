use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::process::Output;
use tokio::process::Command as TokioCommand;

/// Raw invocations of the ffmpeg tool family.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscodeExecutor: Send + Sync {
    async fn run_ffmpeg_cut(
        &self,
        source: &Path,
        start_at: &str,
        duration: &str,
        output_path: &Path,
    ) -> io::Result<Output>;
    async fn run_ffprobe_for_duration(&self, media_path: &Path) -> io::Result<Output>;
}

pub struct RealTranscodeExecutor;

#[async_trait]
impl TranscodeExecutor for RealTranscodeExecutor {
    async fn run_ffmpeg_cut(
        &self,
        source: &Path,
        start_at: &str,
        duration: &str,
        output_path: &Path,
    ) -> io::Result<Output> {
        TokioCommand::new("ffmpeg")
            .arg("-y")
            .arg("-ss")
            .arg(start_at)
            .arg("-i")
            .arg(source)
            .arg("-t")
            .arg(duration)
            .arg(output_path)
            .kill_on_drop(true)
            .output()
            .await
    }

    async fn run_ffprobe_for_duration(&self, media_path: &Path) -> io::Result<Output> {
        TokioCommand::new("ffprobe")
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(media_path)
            .kill_on_drop(true)
            .output()
            .await
    }
}
