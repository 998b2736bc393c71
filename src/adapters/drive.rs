//! Object store speaking the Google Drive v3 HTTP API.

use super::{check_response, http_client};
use crate::config::ObjectStoreConfig;
use crate::domain::records::SourceRef;
use crate::error::StoreError;
use crate::ports::object_store::{ByteStream, ObjectStore};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_LENGTH, LOCATION};
use reqwest::Body;
use serde::Deserialize;
use serde_json::json;
use std::io;
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::debug;

pub struct DriveStore {
    http: reqwest::Client,
    access_token: String,
    download_base_url: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

impl DriveStore {
    pub fn new(config: &ObjectStoreConfig) -> Result<Self, StoreError> {
        let http = http_client(config.http)?;
        Ok(Self {
            http,
            access_token: config.access_token.clone(),
            download_base_url: config.download_base_url.clone(),
            upload_url: config.upload_url.clone(),
        })
    }

    /// Public download URL of an object.
    pub fn object_url(&self, id: &str) -> String {
        format!("{}{}", self.download_base_url, id)
    }

    fn source_url(&self, source: &SourceRef) -> String {
        match source {
            SourceRef::Url(url) => url.clone(),
            SourceRef::Object(id) => self.object_url(id),
        }
    }

    /// Opens a resumable upload session and returns its URL.
    async fn start_session(
        &self,
        name: &str,
        folder: &str,
        size: u64,
    ) -> Result<String, StoreError> {
        let metadata = if folder.is_empty() {
            json!({ "name": name })
        } else {
            json!({ "name": name, "parents": [folder] })
        };
        let response = self
            .http
            .post(&self.upload_url)
            .bearer_auth(&self.access_token)
            .header("X-Upload-Content-Length", size)
            .json(&metadata)
            .send()
            .await?;
        let response = check_response(response).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| StoreError::Decode("upload session without Location header".into()))
    }
}

#[async_trait]
impl ObjectStore for DriveStore {
    async fn download(&self, source: &SourceRef) -> Result<ByteStream, StoreError> {
        let url = self.source_url(source);
        debug!(url = %url, "Opening download");

        let mut request = self.http.get(&url);
        if matches!(source, SourceRef::Object(_)) {
            request = request.bearer_auth(&self.access_token);
        }
        let response = check_response(request.send().await?).await?;

        Ok(Box::pin(response.bytes_stream().map_err(|e| {
            if e.is_timeout() {
                io::Error::new(io::ErrorKind::TimedOut, e)
            } else {
                io::Error::other(e)
            }
        })))
    }

    async fn upload(
        &self,
        local_path: &Path,
        name: &str,
        folder: &str,
    ) -> Result<String, StoreError> {
        let file = tokio::fs::File::open(local_path).await?;
        let size = file.metadata().await?.len();
        let session = self.start_session(name, folder, size).await?;

        let response = self
            .http
            .put(&session)
            .bearer_auth(&self.access_token)
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;
        let created: CreatedFile = check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        debug!(name, id = %created.id, bytes = size, "Upload complete");
        Ok(self.object_url(&created.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpTimeouts, ObjectStoreBackend};
    use axum::{routing::get, Router};
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use std::path::PathBuf;
    use std::time::Duration;

    fn store_with(http: HttpTimeouts) -> DriveStore {
        DriveStore::new(&ObjectStoreConfig {
            backend: ObjectStoreBackend::Drive,
            access_token: "token".into(),
            default_folder: "folderA".into(),
            download_base_url: "https://drive.google.com/uc?export=download&id=".into(),
            upload_url: "https://www.googleapis.com/upload/drive/v3/files?uploadType=resumable"
                .into(),
            local_root: PathBuf::from("./store"),
            http,
        })
        .unwrap()
    }

    fn store() -> DriveStore {
        store_with(HttpTimeouts::default())
    }

    /// Serves `chunks` bytes at `/video`, waiting `gap` before each one.
    async fn serve_slowly(chunks: usize, gap: Duration) -> String {
        let app = Router::new().route(
            "/video",
            get(move || async move {
                let body = stream::iter(0..chunks).then(move |i| async move {
                    tokio::time::sleep(gap).await;
                    Ok::<_, io::Error>(Bytes::from(format!("chunk{};", i)))
                });
                axum::body::Body::from_stream(body)
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}/video", addr)
    }

    async fn read_all(stream: ByteStream) -> io::Result<Vec<u8>> {
        stream
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
    }

    #[tokio::test]
    async fn test_download_longer_than_read_timeout_completes() {
        let url = serve_slowly(6, Duration::from_millis(300)).await;
        let store = store_with(HttpTimeouts {
            connect: Duration::from_secs(1),
            read: Duration::from_secs(1),
        });

        let stream = store.download(&SourceRef::Url(url)).await.unwrap();
        let body = read_all(stream).await.unwrap();

        assert_eq!(
            String::from_utf8(body).unwrap(),
            "chunk0;chunk1;chunk2;chunk3;chunk4;chunk5;"
        );
    }

    #[tokio::test]
    async fn test_stalled_download_reports_timed_out() {
        let url = serve_slowly(2, Duration::from_millis(800)).await;
        let store = store_with(HttpTimeouts {
            connect: Duration::from_secs(1),
            read: Duration::from_millis(200),
        });

        let result = match store.download(&SourceRef::Url(url)).await {
            Ok(stream) => read_all(stream).await.map(|_| ()).map_err(|e| e.kind()),
            Err(e) => {
                assert!(matches!(e, StoreError::Timeout), "unexpected {:?}", e);
                Err(io::ErrorKind::TimedOut)
            }
        };

        assert_eq!(result, Err(io::ErrorKind::TimedOut));
    }

    #[test]
    fn test_object_url() {
        assert_eq!(
            store().object_url("1AbC"),
            "https://drive.google.com/uc?export=download&id=1AbC"
        );
    }

    #[test]
    fn test_source_url_keeps_plain_urls() {
        let store = store();
        assert_eq!(
            store.source_url(&SourceRef::Url("https://cdn.example.com/a.mp4".into())),
            "https://cdn.example.com/a.mp4"
        );
        assert_eq!(
            store.source_url(&SourceRef::Object("xyz".into())),
            "https://drive.google.com/uc?export=download&id=xyz"
        );
    }

    #[test]
    fn test_created_file_response() {
        let created: CreatedFile =
            serde_json::from_str(r#"{"kind":"drive#file","id":"1XyZ","name":"rec1_000.mp4"}"#)
                .unwrap();
        assert_eq!(created.id, "1XyZ");
    }
}
