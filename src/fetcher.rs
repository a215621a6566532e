//! Upstream HTTP fetcher with retry-on-throttle
//!
//! Issues one logical GET request, retrying with exponential backoff while the
//! upstream answers `429 Too Many Requests`, and classifies the final result
//! as [`Outcome::Success`], [`Outcome::Throttled`] or [`Outcome::Failure`].
//! Only throttling is treated as recoverable by the caller.

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

use crate::config::RetryPolicy;
use crate::request::QueryParams;

/// Upstream signalled rate limiting and retries did not clear it
#[derive(Debug, Error)]
pub enum ThrottleError {
    /// Every attempt was answered with 429
    #[error("Rate limit exceeded (429) after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// A generic error whose description indicates rate limiting
    #[error("Rate limit exceeded: {0}")]
    Inferred(#[source] UpstreamError),
}

/// Upstream request failed for a reason other than throttling
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Response status outside the 2xx range, with the body's `reason` if present
    #[error("API returned status code: {code}{}", reason_suffix(.reason))]
    Status { code: u16, reason: Option<String> },

    /// Connection, timeout or protocol failure
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// 2xx response whose body is not valid JSON
    ///
    /// Never classified as throttling: parser positions such as
    /// "column 429" would otherwise match the throttle heuristic.
    #[error("Failed to parse JSON response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl UpstreamError {
    /// Returns true if the error text reads like rate limiting
    pub fn suggests_throttling(&self) -> bool {
        match self {
            UpstreamError::Status { .. } | UpstreamError::Transport(_) => {
                is_throttle_message(&self.to_string())
            }
            UpstreamError::Malformed(_) => false,
        }
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|reason| format!(" ({})", reason))
        .unwrap_or_default()
}

/// Terminal result of a fetch
#[derive(Debug)]
pub enum Outcome {
    Success(Value),
    Throttled(ThrottleError),
    Failure(UpstreamError),
}

/// Returns true if an error description looks like rate limiting
///
/// Some transports surface throttling as a generic error rather than a
/// status code; this is the last-resort classification for those.
pub fn is_throttle_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("429")
        || message.contains("too many requests")
        || message.contains("rate limit")
}

/// Delay to wait before retry number `retry` (1-based)
///
/// `base_delay * multiplier^(retry - 1)`, randomized by up to ±10% when
/// jitter is enabled.
pub fn backoff_delay(policy: &RetryPolicy, retry: u32) -> Duration {
    if retry == 0 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
    let mut delay_ms =
        policy.base_delay.as_millis() as f64 * policy.multiplier.powi(exponent);
    if !delay_ms.is_finite() || delay_ms >= u64::MAX as f64 {
        return Duration::MAX;
    }

    if policy.jitter && delay_ms > 0.0 {
        let jitter = delay_ms * 0.1;
        delay_ms += rand::thread_rng().gen_range(-jitter..=jitter);
    }

    Duration::from_millis(delay_ms.max(0.0) as u64)
}

/// HTTP client that retries throttled GET requests
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    client: Client,
    policy: RetryPolicy,
    timeout: Duration,
}

impl RetryingFetcher {
    /// Create a fetcher with a fresh HTTP client
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Self {
        Self::with_client(Client::new(), policy, timeout)
    }

    /// Create a fetcher with a custom HTTP client
    pub fn with_client(client: Client, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            client,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch `url` with `params` as the query string
    ///
    /// # Returns
    /// * `Outcome::Success` - 2xx response with a JSON body
    /// * `Outcome::Throttled` - 429 on every attempt, or a status or transport
    ///   error that reads like rate limiting
    /// * `Outcome::Failure` - any other status, transport or parse error
    pub async fn call(&self, url: &str, params: &QueryParams) -> Outcome {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            match self.attempt(url, params).await {
                Ok(body) => {
                    tracing::info!(url, attempt, "API call successful");
                    return Outcome::Success(body);
                }
                Err(AttemptError::Throttled) if attempt < max_attempts => {
                    let delay = backoff_delay(&self.policy, attempt);
                    tracing::warn!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(AttemptError::Throttled) => {
                    tracing::error!(
                        url,
                        attempts = attempt,
                        "Rate limit exceeded after all retries"
                    );
                    return Outcome::Throttled(ThrottleError::RetriesExhausted {
                        attempts: attempt,
                    });
                }
                Err(AttemptError::Upstream(e)) => return classify(url, e),
            }
        }
    }

    /// Issue a single GET request
    async fn attempt(&self, url: &str, params: &QueryParams) -> Result<Value, AttemptError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::Throttled);
        }
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                code: status.as_u16(),
                reason: error_reason(&body),
            }
            .into());
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        let body = serde_json::from_slice(&bytes).map_err(UpstreamError::from)?;
        Ok(body)
    }
}

/// Failure of a single attempt
enum AttemptError {
    Throttled,
    Upstream(UpstreamError),
}

impl From<UpstreamError> for AttemptError {
    fn from(e: UpstreamError) -> Self {
        AttemptError::Upstream(e)
    }
}

/// Strips the URL so query values cannot trip the throttle heuristic
fn transport_error(e: reqwest::Error) -> UpstreamError {
    UpstreamError::Transport(e.without_url())
}

/// Extracts the `reason` field of an Open-Meteo error body
fn error_reason(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("reason")?.as_str().map(str::to_string)
}

/// Maps a non-429 error to its terminal outcome
fn classify(url: &str, error: UpstreamError) -> Outcome {
    let message = error.to_string();
    if error.suggests_throttling() {
        tracing::error!(url, error = %message, "Rate limit exceeded after all retries");
        return Outcome::Throttled(ThrottleError::Inferred(error));
    }

    tracing::error!(url, error = %message, "API call failed");
    Outcome::Failure(error)
}
