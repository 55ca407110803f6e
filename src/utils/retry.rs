use std::time::Duration;
use tokio::time::sleep;

use crate::metrics::Metrics;

// ============================================================================
// Exponential Backoff Retry Strategy
// ============================================================================
//
// Retries transient failures of outbound calls (gateway timeouts, 5xx, 429).
// Permanent failures return immediately.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Reads that are safe to repeat (status lookups)
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }

    /// Writes that create gateway resources; one retry at most
    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_millis(((delay.as_millis() as f64) * self.multiplier) as u64).min(self.max_delay)
    }
}

/// Result of a retry operation
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded
    Success(T),
    /// Operation failed after all retries
    Failed(E),
    /// Operation permanently failed (should not retry)
    PermanentFailure(E),
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => Err(e),
        }
    }
}

/// Check if an error is transient (should retry) or permanent (should not retry)
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Retry with transient error checking.
///
/// `operation` names the call in logs and in the retry metrics.
pub async fn retry_on_transient<F, Fut, T, E>(
    config: &RetryConfig,
    operation: &str,
    metrics: Option<&Metrics>,
    mut call: F,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        if attempt > 1 {
            if let Some(m) = metrics {
                m.record_retry_attempt(operation, attempt);
            }
        }

        match call(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Operation succeeded after retry");
                    if let Some(m) = metrics {
                        m.record_retry_outcome(operation, true);
                    }
                }
                return RetryResult::Success(result);
            }
            Err(error) => {
                if !error.is_transient() {
                    tracing::debug!(operation, error = %error, "Permanent failure, not retrying");
                    return RetryResult::PermanentFailure(error);
                }

                if attempt >= config.max_attempts {
                    tracing::error!(
                        operation,
                        attempt,
                        error = %error,
                        "Operation failed after all retries"
                    );
                    if let Some(m) = metrics {
                        m.record_retry_outcome(operation, false);
                    }
                    return RetryResult::Failed(error);
                }

                tracing::warn!(
                    operation,
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying after delay"
                );

                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (transient: {})", self.transient)
        }
    }

    impl IsTransient for TestError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_eventually() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let metrics = Metrics::new().unwrap();

        let result = retry_on_transient(&fast(), "lookup", Some(&metrics), |_attempt| {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(TestError { transient: true })
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert!(matches!(result, RetryResult::Success("success")));
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        let gathered = metrics.registry().gather();
        let ok = gathered.iter().find(|m| m.name() == "retry_success_total").unwrap();
        assert_eq!(ok.metric[0].counter.value, Some(1.0));
    }

    #[tokio::test]
    async fn test_retry_fails_after_max_attempts() {
        let config = RetryConfig { max_attempts: 2, ..fast() };

        let result = retry_on_transient(&config, "lookup", None, |_attempt| async {
            Err::<(), _>(TestError { transient: true })
        })
        .await;

        assert!(matches!(result, RetryResult::Failed(_)));
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_on_transient(&fast(), "create", None, |_attempt| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError { transient: false })
            }
        })
        .await;

        assert!(matches!(result, RetryResult::PermanentFailure(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(result.into_result().is_err());
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = fast();
        assert_eq!(config.next_delay(Duration::from_millis(10)), Duration::from_millis(20));
        assert_eq!(config.next_delay(Duration::from_millis(80)), Duration::from_millis(100));
    }
}
