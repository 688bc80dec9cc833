// src/services/invoker.rs
use crate::config::GENERATION_TIMEOUT;
use crate::errors::FalImageError;
use crate::models::{FalPayload, UpstreamResponse};
use crate::services::fal_client::FalApi;
use crate::services::router::Endpoint;
use log::{info, warn};
use std::time::Duration;
use tokio::time::Instant;

/// Lowercased substrings that mark a failure as transient.
pub const RETRYABLE_SIGNALS: &[&str] = &[
    "rate limit",
    "429",
    "502",
    "503",
    "econnreset",
    "connection reset",
    "etimedout",
    "connection timed out",
    "enotfound",
    "dns error",
    "temporarily unavailable",
    "too many requests",
];

pub fn is_retryable(err: &FalImageError) -> bool {
    let message = err.to_string().to_lowercase();
    RETRYABLE_SIGNALS.iter().any(|signal| message.contains(signal))
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Deadline shared by all attempts, not reset per retry.
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30_000),
            deadline: GENERATION_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-indexed).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let delay = self.initial_backoff.saturating_mul(2u32.pow(exp));
        delay.min(self.max_backoff)
    }
}

/// Calls the endpoint, retrying transient failures with exponential backoff.
/// Once retries run out the last failure is returned as-is.
pub async fn invoke(
    api: &dyn FalApi,
    endpoint: Endpoint,
    payload: &FalPayload,
    policy: &RetryPolicy,
) -> Result<UpstreamResponse, FalImageError> {
    let deadline = Instant::now() + policy.deadline;
    let mut retry = 0;

    loop {
        let attempt = tokio::time::timeout_at(deadline, api.run(endpoint, payload)).await;

        let err = match attempt {
            Ok(Ok(response)) => {
                if retry > 0 {
                    info!("{} succeeded after {} retries", endpoint, retry);
                }
                return Ok(response);
            }
            Ok(Err(err)) => err,
            Err(_) => return Err(timeout_error(policy)),
        };

        if retry >= policy.max_retries || !is_retryable(&err) {
            return Err(err);
        }

        retry += 1;
        let delay = policy.backoff_delay(retry);
        warn!(
            "{} failed ({}), retry {}/{} in {}ms",
            endpoint,
            err,
            retry,
            policy.max_retries,
            delay.as_millis()
        );

        if Instant::now() + delay >= deadline {
            tokio::time::sleep_until(deadline).await;
            return Err(timeout_error(policy));
        }
        tokio::time::sleep(delay).await;
    }
}

fn timeout_error(policy: &RetryPolicy) -> FalImageError {
    FalImageError::Timeout(format!(
        "generation timed out after {}s",
        policy.deadline.as_secs()
    ))
}
