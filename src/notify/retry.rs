//! Retry with exponential backoff for channel deliveries

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use super::transport::TransportError;

/// Backoff schedule for transient delivery failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each following retry
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Extra random delay as a fraction of the computed delay (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (0-based), without jitter
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// [`RetryPolicy::delay_for`] plus random jitter
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let delay = self.delay_for(retry);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter.min(1.0));
        delay + delay.mul_f64(extra)
    }
}

/// Why a single delivery failed
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Endpoint returned status {0}")]
    Status(u16),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Invalid email address: {0:?}")]
    InvalidAddress(String),

    #[error("Integration lookup failed: {0}")]
    Integration(String),
}

impl DeliveryError {
    /// Timeouts, network failures, 5xx, 408 and 429 are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Timeout(_) => true,
            DeliveryError::Status(status) => *status >= 500 || *status == 408 || *status == 429,
            DeliveryError::Transport(e) => e.is_retryable(),
            DeliveryError::InvalidAddress(_) | DeliveryError::Integration(_) => false,
        }
    }
}

/// Result of a retried operation with the number of attempts made
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, DeliveryError>,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
///
/// Each attempt is bounded by `timeout`; hitting it counts as a retryable
/// failure.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    label: &str,
    mut op: F,
) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeliveryError>>,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;

        let result = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(timeout)),
        };

        match result {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts,
                }
            }
            Err(e) if e.is_retryable() && attempts <= policy.max_retries => {
                let delay = policy.jittered_delay(attempts - 1);
                tracing::warn!(
                    delivery = %label,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Attempted {
                    result: Err(e),
                    attempts,
                }
            }
        }
    }
}
