//! Bounded retry for optimistic-concurrency conflicts.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::handlers::HandlerError;

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }
}

/// Run `operation`, retrying on [`HandlerError::Conflict`] with jittered
/// exponential backoff. The operation must re-fetch current state on every
/// attempt so a retry reapplies against the newest revision; any other
/// error returns immediately.
pub async fn retry_on_conflict<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, HandlerError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, HandlerError>>,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(HandlerError::Conflict(msg)) if attempt < config.max_attempts => {
                let jitter = rand::rng().random_range(0.5..1.5);
                let jittered =
                    Duration::from_secs_f64(delay.as_secs_f64() * jitter);
                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %msg,
                    delay_ms = jittered.as_millis() as u64,
                    "conflict, retrying"
                );
                tokio::time::sleep(jittered).await;
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
            Err(err) => return Err(err),
        }
    }
}
