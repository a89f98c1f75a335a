//! Retry policy with exponential backoff for request dispatch.

use crate::error::Error;
use reqwest::header::HeaderMap;
use std::time::{Duration, SystemTime};
use tokio::time::sleep;
use tracing::debug;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Parses the `Retry-After` HTTP header and returns the delay duration.
///
/// Both formats are accepted: delay in seconds (`Retry-After: 120`) and
/// HTTP-date. Returns `None` if the header is absent, malformed, or in the
/// past.
#[must_use]
pub fn parse_retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?;
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = httpdate::parse_http_date(value).ok()?;
    date.duration_since(SystemTime::now()).ok()
}

/// Whether a transport error is worth another attempt.
#[must_use]
pub fn is_retryable_error(error: &reqwest::Error) -> bool {
    // Connect and timeout failures may clear up on their own; for status
    // errors, defer to the code. Anything without a status (body read,
    // decode) gets the benefit of the doubt.
    error.is_connect()
        || error.is_timeout()
        || error
            .status()
            .is_none_or(|status| is_retryable_status(status.as_u16()))
}

/// Whether an HTTP status code is worth another attempt: 408 Request
/// Timeout, 429 Too Many Requests, and server errors that are not
/// 501 Not Implemented or 505 HTTP Version Not Supported.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    if status == 408 || status == 429 {
        return true;
    }
    status >= 500 && status < 600 && status != 501 && status != 505
}

/// Delay before retry number `retry` (0-based): the initial delay grown by
/// the multiplier once per prior retry, capped at `max_delay_ms`, with up to
/// 25% random jitter on top when enabled.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn backoff_delay(config: &RetryConfig, retry: u32) -> Duration {
    let cap = config.max_delay_ms as f64;
    let mut delay_ms = config.initial_delay_ms as f64;
    let mut step = 0;
    while step < retry && delay_ms < cap {
        delay_ms *= config.backoff_multiplier;
        step += 1;
    }
    delay_ms = delay_ms.min(cap);

    if config.jitter {
        delay_ms += delay_ms * 0.25 * fastrand::f64();
    }
    Duration::from_secs_f64(delay_ms / 1000.0)
}

/// Drives an operation through the retry policy.
///
/// # Errors
///
/// A non-retryable error is returned immediately; otherwise the operation is
/// re-run with backoff until it succeeds or `max_attempts` is reached.
pub async fn execute_with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, reqwest::Error>>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if !is_retryable_error(&error) {
            return Err(Error::transient_network_error(error.to_string(), false));
        }
        attempt += 1;
        if attempt >= attempts {
            return Err(Error::retry_limit_exceeded(attempts, error.to_string()));
        }

        let delay = backoff_delay(config, attempt - 1);
        debug!(
            operation = operation_name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "attempt failed, backing off: {error}"
        );
        sleep(delay).await;
    }
}
