//! Adapters - Concrete implementations of ports.

pub mod airtable;
pub mod drive;
pub mod ffmpeg;
pub mod local;

use crate::config::HttpTimeouts;
use crate::error::StoreError;
use reqwest::{Response, StatusCode};

/// Client bounded per connection only, so long transfers are not cut off.
pub(crate) fn http_client(timeouts: HttpTimeouts) -> Result<reqwest::Client, StoreError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read)
        .build()?)
}

/// Maps a non-success response to the matching store error.
pub(crate) async fn check_response(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(StoreError::RateLimited);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
