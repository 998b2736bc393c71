//! Run-scoped local working directory.
//!
//! All jobs of a run share one directory. Every file a job creates is
//! prefixed with its record identifier, so jobs never touch each other's
//! files and no locking is needed.

use crate::error::PipelineError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
}

impl ScratchSpace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of the downloaded source media of a record.
    pub fn source_path(&self, record_id: &str, ext: &str) -> PathBuf {
        self.root.join(format!("{}.{}", record_id, ext))
    }

    /// Creates the directory tree if it is missing.
    ///
    /// Fails when the path exists but is not a directory.
    pub async fn ensure(&self) -> Result<(), PipelineError> {
        let existed = fs::metadata(&self.root).await.is_ok();
        fs::create_dir_all(&self.root).await?;
        if !existed {
            info!(dir = ?self.root, "Scratch directory created");
        }
        Ok(())
    }

    /// Removes every entry under the directory.
    ///
    /// Individual failures are logged and skipped; the call fails only after
    /// every entry has been attempted.
    pub async fn clear(&self) -> Result<usize, PipelineError> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut removed = 0;
        let mut failed: Vec<PathBuf> = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // file_type() does not follow symlinks, so a link to a directory
            // is unlinked rather than recursed into.
            let result = match entry.file_type().await {
                Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path).await,
                Ok(_) => fs::remove_file(&path).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to delete scratch entry");
                    failed.push(path);
                }
            }
        }

        debug!(dir = ?self.root, removed, "Scratch directory cleared");

        match failed.first() {
            None => Ok(removed),
            Some(first) => Err(PipelineError::CleanupError {
                dir: self.root.clone(),
                failed: failed.len(),
                first: first.clone(),
            }),
        }
    }

    /// Removes a single file or symlink. Missing paths are not an error.
    /// Returns whether something was removed.
    pub async fn remove_file(&self, path: &Path) -> Result<bool, PipelineError> {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = ?path, "File removed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal used on failure paths.
    pub async fn discard(&self, path: &Path) {
        if let Err(e) = self.remove_file(path).await {
            warn!(path = ?path, error = %e, "Failed to delete file");
        }
    }
}
