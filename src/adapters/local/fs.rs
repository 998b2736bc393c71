use crate::domain::records::SourceRef;
use crate::error::StoreError;
use crate::ports::object_store::{ByteStream, ObjectStore};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Object store kept in a directory tree: `root/<folder>/<name>`.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a relative object key under the root, refusing keys that
    /// would step outside it.
    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if key.is_empty() || escapes {
            return Err(StoreError::Status {
                status: 400,
                body: format!("invalid object key {:?}", key),
            });
        }
        Ok(self.root.join(relative))
    }

    fn source_path(&self, source: &SourceRef) -> Result<PathBuf, StoreError> {
        match source {
            SourceRef::Object(id) => self.resolve(id),
            SourceRef::Url(url) => url
                .strip_prefix("file://")
                .map(PathBuf::from)
                .ok_or_else(|| {
                    StoreError::Transport(format!("local store cannot fetch {}", url))
                }),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn download(&self, source: &SourceRef) -> Result<ByteStream, StoreError> {
        let path = self.source_path(source)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::Status {
                    status: 404,
                    body: format!("{:?} not found", path),
                })
            }
            Err(e) => return Err(e.into()),
        };
        debug!(path = ?path, "Opened local object");
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn upload(
        &self,
        local_path: &Path,
        name: &str,
        folder: &str,
    ) -> Result<String, StoreError> {
        let key = if folder.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", folder, name)
        };
        let target = self.resolve(&key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &target).await?;

        let absolute = tokio::fs::canonicalize(&target).await?;
        Ok(format!("file://{}", absolute.display()))
    }
}
