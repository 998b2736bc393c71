use crate::domain::records::SourceRef;
use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::path::Path;

/// Body of a download, consumed chunk by chunk.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open the remote object or URL for reading
    async fn download(&self, source: &SourceRef) -> Result<ByteStream, StoreError>;

    /// Upload a local file as `name` inside `folder`.
    /// Returns an externally resolvable URL of the new object.
    async fn upload(
        &self,
        local_path: &Path,
        name: &str,
        folder: &str,
    ) -> Result<String, StoreError>;
}
