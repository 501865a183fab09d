//! Opt-in retry wrapper for providers
//!
//! The executor never retries. Wrapping a provider in [`RetryingProvider`]
//! retries transient errors (`ProviderError::Api`) with exponential backoff.

use crate::error::ProviderResult;
use crate::provider::{AttributeClass, Created, ResourceProvider};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::Attributes;
use tracing::warn;

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (1 disables retry)
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(retry as i32);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Provider decorator retrying transient failures
pub struct RetryingProvider {
    inner: Arc<dyn ResourceProvider>,
    config: RetryConfig,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn ResourceProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn retry<T, F, Fut>(&self, operation: &str, mut call: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    let delay = self.config.delay_for_retry(attempt - 1);
                    warn!(
                        provider = self.inner.name(),
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl ResourceProvider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn resource_types(&self) -> Vec<String> {
        self.inner.resource_types()
    }

    fn classify_attribute(&self, resource_type: &str, attribute: &str) -> AttributeClass {
        self.inner.classify_attribute(resource_type, attribute)
    }

    fn create_before_destroy(&self, resource_type: &str) -> bool {
        self.inner.create_before_destroy(resource_type)
    }

    async fn create(
        &self,
        resource_type: &str,
        attributes: &Attributes,
    ) -> ProviderResult<Created> {
        self.retry("create", || self.inner.create(resource_type, attributes))
            .await
    }

    async fn read(&self, resource_type: &str, id: &str) -> ProviderResult<Attributes> {
        self.retry("read", || self.inner.read(resource_type, id)).await
    }

    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        attributes: &Attributes,
    ) -> ProviderResult<Attributes> {
        self.retry("update", || self.inner.update(resource_type, id, attributes))
            .await
    }

    async fn delete(&self, resource_type: &str, id: &str) -> ProviderResult<()> {
        self.retry("delete", || self.inner.delete(resource_type, id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times with the given error, then succeeds
    struct FlakyProvider {
        failures: u32,
        error: ProviderError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ResourceProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn resource_types(&self) -> Vec<String> {
            vec!["flaky_thing".to_string()]
        }

        fn classify_attribute(&self, _: &str, _: &str) -> AttributeClass {
            AttributeClass::Updatable
        }

        async fn create(&self, _: &str, attributes: &Attributes) -> ProviderResult<Created> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(self.error.clone());
            }
            Ok(Created::new("flaky-1", attributes.clone()))
        }

        async fn read(&self, t: &str, id: &str) -> ProviderResult<Attributes> {
            Err(ProviderError::not_found(t, id))
        }

        async fn update(&self, _: &str, _: &str, a: &Attributes) -> ProviderResult<Attributes> {
            Ok(a.clone())
        }

        async fn delete(&self, _: &str, _: &str) -> ProviderResult<()> {
            Ok(())
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_for_retry_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_retry(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_retry(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_retry(3), Duration::from_secs(8));
        assert_eq!(config.delay_for_retry(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let inner = Arc::new(FlakyProvider {
            failures: 2,
            error: ProviderError::Api("throttled".into()),
            calls: AtomicU32::new(0),
        });
        let provider = RetryingProvider::new(inner.clone(), fast_config(3));

        let created = provider
            .create("flaky_thing", &Attributes::new())
            .await
            .unwrap();
        assert_eq!(created.id, "flaky-1");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Arc::new(FlakyProvider {
            failures: 5,
            error: ProviderError::Api("throttled".into()),
            calls: AtomicU32::new(0),
        });
        let provider = RetryingProvider::new(inner.clone(), fast_config(2));

        let err = provider
            .create("flaky_thing", &Attributes::new())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let inner = Arc::new(FlakyProvider {
            failures: 1,
            error: ProviderError::Failed("bad request".into()),
            calls: AtomicU32::new(0),
        });
        let provider = RetryingProvider::new(inner.clone(), fast_config(5));

        let err = provider
            .create("flaky_thing", &Attributes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Failed(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
