//! Command-line interface parsing for skycache
//!
//! Parses coordinates and service tunables with clap, and shapes the JSON
//! response envelope printed to stdout.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::cache::DiskStore;
use crate::config::{RetryPolicy, ServiceConfig, DEFAULT_BASE_URL};
use crate::coordinator::{FetchResult, Source};
use crate::forecast::{ForecastRequest, ValidationError, DEFAULT_LATITUDE, DEFAULT_LONGITUDE};

/// Timestamp format used in the response envelope
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// Coordinates failed validation
    #[error(transparent)]
    InvalidCoordinates(#[from] ValidationError),

    /// No cache directory was given and none could be determined
    #[error("Could not determine a cache directory; pass --cache-dir")]
    NoCacheDir,
}

/// skycache - Cached Open-Meteo temperature forecasts
#[derive(Parser, Debug)]
#[command(name = "skycache")]
#[command(about = "Fetch an Open-Meteo forecast, served from cache when fresh or rate limited")]
#[command(version)]
pub struct Cli {
    /// Latitude in degrees, between -90 and 90
    #[arg(long, default_value_t = DEFAULT_LATITUDE, allow_negative_numbers = true)]
    pub latitude: f64,

    /// Longitude in degrees, between -180 and 180
    #[arg(long, default_value_t = DEFAULT_LONGITUDE, allow_negative_numbers = true)]
    pub longitude: f64,

    /// Upstream API base URL
    #[arg(long, env = "SKYCACHE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Directory for cached responses (defaults to the platform cache dir)
    #[arg(long, env = "SKYCACHE_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Seconds a cached response stays fresh
    #[arg(long, default_value_t = 300)]
    pub ttl_secs: u64,

    /// Retries after a 429 response
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Per-attempt request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Log debug events to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Validated forecast request from the coordinate flags
    pub fn forecast_request(&self) -> Result<ForecastRequest, CliError> {
        Ok(ForecastRequest::new(self.latitude, self.longitude)?)
    }

    /// Service configuration from the tunable flags
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            base_url: self.base_url.clone(),
            ttl: Duration::from_secs(self.ttl_secs),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                ..Default::default()
            },
            request_timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    /// Disk store at `--cache-dir`, or the platform cache directory
    pub fn disk_store(&self) -> Result<DiskStore, CliError> {
        match &self.cache_dir {
            Some(dir) => Ok(DiskStore::with_dir(dir.clone())),
            None => DiskStore::new().ok_or(CliError::NoCacheDir),
        }
    }
}

/// JSON document printed on success
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub source: Source,
    pub is_stale: bool,
    pub cached_at: Option<String>,
    pub cache_expires_in_seconds: u64,
    pub timestamp: String,
    pub message: &'static str,
    pub data: Value,
}

/// JSON document printed on failure
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(DISPLAY_FORMAT).to_string()
}

impl From<FetchResult> for Envelope {
    fn from(result: FetchResult) -> Self {
        let message = match result.source {
            Source::Cache => "Data retrieved from cache",
            Source::Api => "Data retrieved from API",
        };

        Self {
            success: true,
            source: result.source,
            is_stale: result.is_stale,
            cached_at: result.cached_at.map(format_timestamp),
            cache_expires_in_seconds: result.expires_in_seconds,
            timestamp: format_timestamp(result.timestamp),
            message,
            data: result.data,
        }
    }
}

impl ErrorEnvelope {
    pub fn new(error: impl ToString) -> Self {
        Self {
            success: false,
            error: error.to_string(),
        }
    }
}
