//! Retry wrapper for storage backends.
//!
//! Only [`Error::Backend`] failures are retried, with exponential backoff,
//! and never more than the configured number of total attempts. Validation,
//! argument, and provider failures pass straight through.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use log::warn;
use std::sync::Arc;
use std::time::Duration;
use vitrine_core::{Dimensions, Error, Modality, Result, VectorRecord};

use crate::backend::StorageBackend;
use crate::types::{NeighborList, RetryConfig};

/// Wraps a storage backend with bounded retry logic.
pub struct RetryingBackend {
    inner: Arc<dyn StorageBackend>,
    max_attempts: usize,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryingBackend {
    /// Create a retry wrapper from a retry budget.
    pub fn new(inner: Arc<dyn StorageBackend>, config: RetryConfig) -> Self {
        Self {
            inner,
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts - 1)
    }

    /// Determines if an error should be retried.
    fn should_retry(error: &Error) -> bool {
        error.is_retryable()
    }

    fn log_retry(operation: &'static str) -> impl Fn(&Error, Duration) {
        move |err, delay| warn!("Retrying backend {operation} in {delay:?} after: {err}")
    }
}

#[async_trait]
impl StorageBackend for RetryingBackend {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        let inner = &self.inner;
        let record = &record;
        (|| async move { inner.upsert(record.clone()).await })
            .retry(self.backoff())
            .when(Self::should_retry)
            .notify(Self::log_retry("upsert"))
            .await
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>> {
        let inner = &self.inner;
        (|| async move { inner.get(id).await })
            .retry(self.backoff())
            .when(Self::should_retry)
            .notify(Self::log_retry("get"))
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let inner = &self.inner;
        (|| async move { inner.delete(id).await })
            .retry(self.backoff())
            .when(Self::should_retry)
            .notify(Self::log_retry("delete"))
            .await
    }

    async fn search_nearest(
        &self,
        query: &[f32],
        modality: Modality,
        k: usize,
    ) -> Result<NeighborList> {
        let inner = &self.inner;
        (|| async move { inner.search_nearest(query, modality, k).await })
            .retry(self.backoff())
            .when(Self::should_retry)
            .notify(Self::log_retry("search"))
            .await
    }

    async fn len(&self) -> Result<usize> {
        let inner = &self.inner;
        (|| async move { inner.len().await })
            .retry(self.backoff())
            .when(Self::should_retry)
            .notify(Self::log_retry("len"))
            .await
    }

    fn dimensions(&self) -> Dimensions {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

impl std::fmt::Debug for RetryingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingBackend")
            .field("inner", &self.inner.name())
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ann::AnnIndexBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls of every operation with `error`.
    struct Flaky {
        inner: AnnIndexBackend,
        failures: usize,
        calls: AtomicUsize,
        error: fn() -> Error,
    }

    impl Flaky {
        fn new(failures: usize, error: fn() -> Error) -> Self {
            Self {
                inner: AnnIndexBackend::in_memory(Dimensions::new(2, 2)),
                failures,
                calls: AtomicUsize::new(0),
                error,
            }
        }

        fn trip(&self) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err((self.error)());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl StorageBackend for Flaky {
        async fn upsert(&self, record: VectorRecord) -> Result<()> {
            self.trip()?;
            self.inner.upsert(record).await
        }

        async fn get(&self, id: &str) -> Result<Option<VectorRecord>> {
            self.trip()?;
            self.inner.get(id).await
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.trip()?;
            self.inner.delete(id).await
        }

        async fn search_nearest(
            &self,
            query: &[f32],
            modality: Modality,
            k: usize,
        ) -> Result<NeighborList> {
            self.trip()?;
            self.inner.search_nearest(query, modality, k).await
        }

        async fn len(&self) -> Result<usize> {
            self.trip()?;
            self.inner.len().await
        }

        fn dimensions(&self) -> Dimensions {
            self.inner.dimensions()
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn fast_retry(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_retries_backend_errors_until_success() {
        let flaky = Arc::new(Flaky::new(2, || Error::backend("connection reset")));
        let retrying = RetryingBackend::new(flaky.clone(), fast_retry(3));

        retrying
            .upsert(VectorRecord::new("p1").with_text_embedding(vec![1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let flaky = Arc::new(Flaky::new(10, || Error::backend("store down")));
        let retrying = RetryingBackend::new(flaky.clone(), fast_retry(3));

        let err = retrying.get("p1").await.unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_validation() {
        let flaky = Arc::new(Flaky::new(10, || Error::validation("bad")));
        let retrying = RetryingBackend::new(flaky.clone(), fast_retry(5));

        assert!(retrying.delete("p1").await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_budget() {
        let flaky = Arc::new(Flaky::new(1, || Error::backend("blip")));
        let retrying = RetryingBackend::new(flaky.clone(), fast_retry(1));

        assert!(retrying.len().await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delegates_name_and_dimensions() {
        let flaky = Arc::new(Flaky::new(0, || Error::backend("unused")));
        let retrying = RetryingBackend::new(flaky, RetryConfig::default());
        assert_eq!(retrying.name(), "flaky");
        assert_eq!(retrying.dimensions(), Dimensions::new(2, 2));
    }
}
