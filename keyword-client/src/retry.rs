use keyharvest_core::{CoreError, ErrorExt, FetchConfig, KeywordApiError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl From<&FetchConfig> for RetryConfig {
    fn from(fetch: &FetchConfig) -> Self {
        Self {
            max_attempts: fetch.max_attempts,
            base_delay_ms: fetch.base_delay_ms,
            max_delay_ms: fetch.max_delay_ms,
            backoff_multiplier: fetch.backoff_multiplier,
            jitter_factor: fetch.jitter_factor,
        }
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after the delay the provider asked for
    RetryWithDelay(Duration),
    /// Don't retry
    NoRetry,
}

/// Determine retry strategy based on error type
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    match error {
        CoreError::KeywordApi(KeywordApiError::RateLimited { retry_after, .. }) => {
            match retry_after {
                Some(seconds) => RetryStrategy::RetryWithDelay(Duration::from_secs(*seconds)),
                None => RetryStrategy::Retry,
            }
        }
        _ => RetryStrategy::NoRetry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let exponential_delay = if attempt == 0 {
        Duration::from_millis(config.base_delay_ms)
    } else {
        let multiplier = config.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms.min(config.max_delay_ms))
    };

    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);
    let final_delay = exponential_delay + Duration::from_millis(jitter);

    final_delay.min(max_delay)
}

/// Retry metrics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_operations: u64,
}

/// Retry executor that wraps operations with retry logic.
///
/// Attempts are bounded by `max_attempts`; nothing is retried indefinitely.
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    total_retries: AtomicU64,
    successful_retries: AtomicU64,
    failed_operations: AtomicU64,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            total_retries: AtomicU64::new(0),
            successful_retries: AtomicU64::new(0),
            failed_operations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic.
    ///
    /// On exhaustion the last error is returned unchanged so the caller can
    /// classify it.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut total_delay = Duration::ZERO;
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            let start_time = Instant::now();
            let error = match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        self.total_retries
                            .fetch_add(attempt as u64, Ordering::Relaxed);
                        self.successful_retries.fetch_add(1, Ordering::Relaxed);
                        info!(
                            "Operation {} succeeded after {} retries (total delay: {:?})",
                            operation_name, attempt, total_delay
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            debug!(
                "Attempt {} failed for {} after {:?}: {}",
                attempt + 1,
                operation_name,
                start_time.elapsed(),
                error
            );

            let has_attempts_left = attempt + 1 < self.config.max_attempts;
            let delay = match get_retry_strategy(&error) {
                RetryStrategy::NoRetry => {
                    debug!("Not retrying {} due to error type: {}", operation_name, error);
                    None
                }
                RetryStrategy::Retry if has_attempts_left => {
                    Some(calculate_delay(attempt, &self.config))
                }
                RetryStrategy::RetryWithDelay(requested) if has_attempts_left => {
                    Some(requested.min(Duration::from_millis(self.config.max_delay_ms)))
                }
                _ => None,
            };

            match delay {
                Some(delay) => {
                    info!(
                        "Retrying {} in {:?} due to: {}",
                        operation_name, delay, error
                    );
                    total_delay += delay;
                    sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    self.total_retries
                        .fetch_add(attempt as u64, Ordering::Relaxed);
                    self.failed_operations.fetch_add(1, Ordering::Relaxed);
                    if error.is_retryable() {
                        warn!(
                            "Operation {} gave up after {} attempts (total delay: {:?}): {}",
                            operation_name,
                            attempt + 1,
                            total_delay,
                            error
                        );
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Get current retry metrics
    pub fn get_metrics(&self) -> RetryMetrics {
        RetryMetrics {
            total_retries: self.total_retries.load(Ordering::Relaxed),
            successful_retries: self.successful_retries.load(Ordering::Relaxed),
            failed_operations: self.failed_operations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn rate_limited(retry_after: Option<u64>) -> CoreError {
        CoreError::KeywordApi(KeywordApiError::RateLimited {
            endpoint: "keysuggest".to_string(),
            retry_after,
        })
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_retry_config_from_fetch_config() {
        let config = RetryConfig::from(&FetchConfig::default());
        assert_eq!(config.max_attempts, 6);
        assert_eq!(config.base_delay_ms, 6000);
        assert!(config.jitter_factor <= 1.0);
    }

    #[test]
    fn test_retry_strategy_for_errors() {
        assert_eq!(get_retry_strategy(&rate_limited(None)), RetryStrategy::Retry);
        assert_eq!(
            get_retry_strategy(&rate_limited(Some(30))),
            RetryStrategy::RetryWithDelay(Duration::from_secs(30))
        );

        let server_error = CoreError::KeywordApi(KeywordApiError::ServerError { status_code: 500 });
        assert_eq!(get_retry_strategy(&server_error), RetryStrategy::NoRetry);
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
            ..Default::default()
        };

        assert_eq!(calculate_delay(0, &config), Duration::from_millis(1000));
        assert_eq!(calculate_delay(1, &config), Duration::from_millis(2000));
        assert_eq!(calculate_delay(2, &config), Duration::from_millis(4000));
        assert_eq!(calculate_delay(3, &config), Duration::from_millis(8000));
        assert_eq!(calculate_delay(10, &config), Duration::from_millis(10000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.5,
            ..Default::default()
        };

        for _ in 0..20 {
            let delay = calculate_delay(1, &config);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(3000));
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let executor = RetryExecutor::new(fast_config(3));

        let result = executor
            .execute("test_operation", || async { Ok::<i32, CoreError>(42) })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(executor.get_metrics(), RetryMetrics::default());
    }

    #[tokio::test]
    async fn test_success_after_rate_limits() {
        let executor = RetryExecutor::new(fast_config(3));
        let attempts = Arc::new(Mutex::new(0));

        let result = executor
            .execute("test_operation", || {
                let attempts = attempts.clone();
                async move {
                    let mut count = attempts.lock().unwrap();
                    *count += 1;
                    if *count < 3 {
                        Err(rate_limited(None))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        let metrics = executor.get_metrics();
        assert_eq!(metrics.total_retries, 2);
        assert_eq!(metrics.successful_retries, 1);
    }

    #[tokio::test]
    async fn test_no_retry_on_transport_error() {
        let executor = RetryExecutor::new(fast_config(3));
        let attempts = Arc::new(Mutex::new(0));

        let result = executor
            .execute("test_operation", || {
                let attempts = attempts.clone();
                async move {
                    *attempts.lock().unwrap() += 1;
                    Err::<i32, CoreError>(CoreError::KeywordApi(KeywordApiError::Transport {
                        endpoint: "topkeys".to_string(),
                        reason: "connection refused".to_string(),
                    }))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(CoreError::KeywordApi(KeywordApiError::Transport { .. }))
        ));
        assert_eq!(*attempts.lock().unwrap(), 1);
        assert_eq!(executor.get_metrics().failed_operations, 1);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let executor = RetryExecutor::new(fast_config(4));
        let attempts = Arc::new(Mutex::new(0));

        let result = executor
            .execute("test_operation", || {
                let attempts = attempts.clone();
                async move {
                    *attempts.lock().unwrap() += 1;
                    Err::<i32, CoreError>(rate_limited(Some(0)))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(CoreError::KeywordApi(KeywordApiError::RateLimited { .. }))
        ));
        assert_eq!(*attempts.lock().unwrap(), 4);
        let metrics = executor.get_metrics();
        assert_eq!(metrics.total_retries, 3);
        assert_eq!(metrics.failed_operations, 1);
    }
}
