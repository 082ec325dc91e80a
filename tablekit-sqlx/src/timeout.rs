use std::future::Future;
use std::time::Duration;

use tablekit::DataError;

/// Await `fut`, giving up after `timeout` when one is set.
pub(crate) async fn with_timeout<F: Future>(
    timeout: Option<Duration>,
    fut: F,
) -> Result<F::Output, DataError> {
    match timeout {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| DataError::Timeout(after)),
        None => Ok(fut.await),
    }
}
