//! Service configuration
//!
//! All tunables are gathered into immutable structs handed to the fetcher and
//! coordinator at construction time.

use std::time::Duration;

/// Default Open-Meteo API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/v1";

/// Endpoint path for forecast requests
pub const FORECAST_ENDPOINT: &str = "/forecast";

/// Retry behaviour for throttled upstream responses
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Factor applied to the delay for each further retry
    pub multiplier: f64,
    /// Randomize each delay by up to ±10%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Total number of attempts, first one included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Configuration for the forecast cache service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Upstream API base URL, without the endpoint path
    pub base_url: String,
    /// How long a cached response is considered fresh
    pub ttl: Duration,
    /// Retry policy for throttled requests
    pub retry: RetryPolicy,
    /// Upper bound on a single upstream attempt
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ttl: Duration::from_secs(300), // 5 minutes
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ServiceConfig {
    /// Creates a config pointing at a custom upstream base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_config_default() {
        let config = ServiceConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
        assert!(policy.jitter);
    }

    #[test]
    fn test_with_base_url_keeps_other_defaults() {
        let config = ServiceConfig::with_base_url("http://localhost:9000");
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.ttl, Duration::from_secs(300));
    }
}
