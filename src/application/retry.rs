use crate::error::StoreError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Runs `op`, retrying exactly once after `backoff` if it fails with a
/// transient error. The second failure, or any permanent one, is returned.
pub async fn retry_transient_once<T, F, Fut>(
    operation: &str,
    backoff: Duration,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match op().await {
        Err(e) if e.is_transient() => {
            warn!(
                operation = %operation,
                delay_ms = backoff.as_millis() as u64,
                "Transient failure, retrying once: {}",
                e
            );
            tokio::time::sleep(backoff).await;
            op().await
        }
        other => other,
    }
}
