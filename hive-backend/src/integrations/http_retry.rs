//! HTTP retry helper with exponential backoff
//!
//! Outbound calls to GitHub and the swarm services go through `send_with_retry`.
//! Transient failures (timeouts, connection errors, 408, 429, 5xx) are retried up to
//! `max_attempts` times; everything else is returned to the caller on the first try.

use std::time::Duration;

use reqwest::{RequestBuilder, Response};

use super::IntegrationError;

/// Default number of attempts, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Delay before the first retry
const BASE_BACKOFF_MS: u64 = 250;
/// Upper bound for a single backoff
const MAX_BACKOFF_MS: u64 = 4_000;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: Duration::from_millis(BASE_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): doubles each time, capped
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        let millis = (self.base_backoff.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis.min(MAX_BACKOFF_MS))
    }
}

/// Check if an HTTP status code indicates a retryable error
pub fn is_retryable_status(status: u16) -> bool {
    matches!(
        status,
        408 | // Request Timeout
        429 | // Too Many Requests
        500..=599
    )
}

/// Helper function to check if a reqwest error is retryable
pub fn is_reqwest_error_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout()
        || err.is_connect()
        || err.status().map(|s| is_retryable_status(s.as_u16())).unwrap_or(false)
}

/// Send a request, rebuilding it for each attempt. The last response is returned
/// as-is (even when its status is an error) so callers can classify it.
pub async fn send_with_retry<F>(
    label: &str,
    policy: RetryPolicy,
    build: F,
) -> Result<Response, IntegrationError>
where
    F: Fn() -> RequestBuilder,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let last = attempt >= attempts;
        match build().send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if last || !is_retryable_status(status) {
                    return Ok(response);
                }
                log::warn!(
                    "[HTTP_RETRY] {} returned {} (attempt {}/{})",
                    label,
                    status,
                    attempt,
                    attempts
                );
            }
            Err(e) => {
                if last || !is_reqwest_error_retryable(&e) {
                    return Err(IntegrationError::Transport(e.to_string()));
                }
                log::warn!(
                    "[HTTP_RETRY] {} failed: {} (attempt {}/{})",
                    label,
                    e,
                    attempt,
                    attempts
                );
            }
        }

        tokio::time::sleep(policy.backoff(attempt)).await;
        attempt += 1;
    }
}
