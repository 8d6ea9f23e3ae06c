//! Deadlines for provider and backend calls.

use std::future::Future;
use std::time::Duration;
use vitrine_core::{Error, Result};

/// Run `future` under `limit`, failing with [`Error::Timeout`] when it
/// elapses. The future is dropped (cancelled) on timeout.
pub async fn with_deadline<T, F>(operation: &str, limit: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(operation, limit)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let value = with_deadline("quick", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let err = with_deadline("slow", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(err.is_modality_recoverable());
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let err = with_deadline::<(), _>("failing", Duration::from_secs(1), async {
            Err(Error::backend("down"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }
}
