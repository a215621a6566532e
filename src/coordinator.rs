//! Cache-aside coordinator for forecast requests
//!
//! Looks up a request fingerprint in a [`CacheStore`] and, on a miss, fetches
//! from the upstream API through a [`RetryingFetcher`]. Throttled misses fall
//! back to the most recent stale entry when one exists; every other failure
//! is surfaced to the caller.
//!
//! At most one upstream fetch runs per cache key at a time. Callers that miss
//! on the same key join a shared in-flight fetch and all receive its result,
//! whether that is fresh data, a stale fallback or a failure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::cache::{CacheEntry, CacheStore, CacheStoreError, Freshness};
use crate::config::{ServiceConfig, FORECAST_ENDPOINT};
use crate::fetcher::{Outcome, RetryingFetcher, ThrottleError, UpstreamError};
use crate::request::{build_url, generate_cache_key, QueryParams};

/// Error surfaced to callers when no response can be produced
///
/// Causes are reference-counted so every caller sharing an in-flight fetch
/// receives the same failure.
#[derive(Debug, Clone, Error)]
pub enum FetchFailure {
    /// Upstream throttled and no stale entry was available
    #[error("Failed to fetch data: {0}")]
    Throttled(#[source] Arc<ThrottleError>),

    /// Upstream failed with a non-throttle error
    #[error("Failed to fetch data: {0}")]
    Upstream(#[source] Arc<UpstreamError>),

    /// The cache store itself failed
    #[error("Failed to fetch data: {0}")]
    CacheStore(#[source] Arc<CacheStoreError>),
}

impl FetchFailure {
    pub fn is_throttled(&self) -> bool {
        matches!(self, FetchFailure::Throttled(_))
    }
}

impl From<ThrottleError> for FetchFailure {
    fn from(e: ThrottleError) -> Self {
        FetchFailure::Throttled(Arc::new(e))
    }
}

impl From<UpstreamError> for FetchFailure {
    fn from(e: UpstreamError) -> Self {
        FetchFailure::Upstream(Arc::new(e))
    }
}

impl From<CacheStoreError> for FetchFailure {
    fn from(e: CacheStoreError) -> Self {
        FetchFailure::CacheStore(Arc::new(e))
    }
}

/// Where the returned data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Api,
    Cache,
}

/// Response body with cache metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    /// Upstream response body
    pub data: Value,
    pub source: Source,
    /// True if the data came from the cache and is older than the TTL
    pub is_stale: bool,
    /// When the data was fetched from the upstream API
    pub cached_at: Option<DateTime<Utc>>,
    /// Seconds until the data is no longer fresh
    pub expires_in_seconds: u64,
    /// When this result was produced
    pub timestamp: DateTime<Utc>,
}

/// Result of one in-flight fetch, shared by every caller that joined it
type Flight = OnceCell<Result<CacheEntry, FetchFailure>>;

type InFlight = Mutex<HashMap<String, Arc<Flight>>>;

/// Cache-aside front for the forecast endpoint
pub struct CacheCoordinator<S> {
    store: S,
    fetcher: RetryingFetcher,
    config: ServiceConfig,
    in_flight: InFlight,
}

impl<S: CacheStore> CacheCoordinator<S> {
    /// Creates a coordinator with a fetcher built from `config`
    pub fn new(store: S, config: ServiceConfig) -> Self {
        let fetcher = RetryingFetcher::new(config.retry.clone(), config.request_timeout);
        Self::with_fetcher(store, fetcher, config)
    }

    pub fn with_fetcher(store: S, fetcher: RetryingFetcher, config: ServiceConfig) -> Self {
        Self {
            store,
            fetcher,
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Full URL of the forecast endpoint
    pub fn endpoint_url(&self) -> String {
        build_url(&self.config.base_url, FORECAST_ENDPOINT)
    }

    /// Returns the freshest available forecast for `params`
    ///
    /// # Returns
    /// * `Ok(FetchResult)` - fresh cache hit, new upstream data, or stale data
    ///   when throttled
    /// * `Err(FetchFailure)` - upstream failure, throttling with nothing
    ///   cached, or a store error
    pub async fn fetch(&self, params: &QueryParams) -> Result<FetchResult, FetchFailure> {
        let started_at = Utc::now();
        let url = self.endpoint_url();
        let key = generate_cache_key(&url, params);

        let entry = match self.get_or_fetch(&url, &key, params).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!(url = %url, cache_key = %key, error = %e, "Error fetching data");
                return Err(e);
            }
        };

        Ok(self.describe(entry, started_at, Utc::now()))
    }

    /// Builds the caller-facing result for an entry
    ///
    /// An entry cached at or after `started_at` was produced during this call
    /// and is reported as coming from the API. This is a timestamp comparison,
    /// not a flag; callers that waited on another caller's in-flight fetch
    /// also see `Source::Api`.
    fn describe(
        &self,
        entry: CacheEntry,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> FetchResult {
        let ttl = chrono::Duration::from_std(self.config.ttl).unwrap_or(chrono::Duration::MAX);
        let freshness = Freshness::evaluate(entry.cached_at, now, ttl);
        let source = if entry.cached_at >= started_at {
            Source::Api
        } else {
            Source::Cache
        };

        FetchResult {
            data: entry.data,
            source,
            is_stale: source == Source::Cache && freshness.is_expired,
            cached_at: Some(entry.cached_at),
            expires_in_seconds: freshness.expires_in_seconds,
            timestamp: now,
        }
    }

    async fn get_or_fetch(
        &self,
        url: &str,
        key: &str,
        params: &QueryParams,
    ) -> Result<CacheEntry, FetchFailure> {
        if let Some(entry) = self.store.get(key)? {
            tracing::debug!(cache_key = key, "Cache hit");
            return Ok(entry);
        }

        let flight = self.join(key)?;
        let result = flight
            .cell
            .get_or_init(|| self.fetch_uncached(url, key, params))
            .await;
        result.clone()
    }

    /// Miss path, run by the one caller leading the key's in-flight fetch
    async fn fetch_uncached(
        &self,
        url: &str,
        key: &str,
        params: &QueryParams,
    ) -> Result<CacheEntry, FetchFailure> {
        // A previous flight may have filled the entry since our first lookup.
        if let Some(entry) = self.store.get(key)? {
            tracing::debug!(cache_key = key, "Cache filled while waiting");
            return Ok(entry);
        }

        tracing::info!(url, cache_key = key, "Cache miss - Fetching from API");

        match self.fetcher.call(url, params).await {
            Outcome::Success(data) => {
                let entry = CacheEntry::new(data);
                self.store.put(key, &entry, self.config.ttl)?;
                Ok(entry)
            }
            Outcome::Throttled(e) => match self.stale_entry(key) {
                Some(entry) => {
                    tracing::warn!(
                        url,
                        cache_key = key,
                        error = %e,
                        stale_age_seconds = entry.age_at(Utc::now()).num_seconds(),
                        "Rate limit exceeded after retries - Using stale cache"
                    );
                    Ok(entry)
                }
                None => Err(e.into()),
            },
            Outcome::Failure(e) => Err(e.into()),
        }
    }

    /// Reads an entry ignoring expiry; store errors count as no entry
    fn stale_entry(&self, key: &str) -> Option<CacheEntry> {
        match self.store.get_stale(key) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(cache_key = key, error = %e, "Could not retrieve stale cache");
                None
            }
        }
    }

    /// Joins the in-flight fetch for `key`, starting a new one if none is running
    fn join<'a>(&'a self, key: &'a str) -> Result<FlightGuard<'a>, FetchFailure> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| FetchFailure::from(CacheStoreError::Poisoned))?;

        let cell = match in_flight.get(key) {
            Some(cell) => {
                tracing::debug!(cache_key = key, "Joining in-flight fetch");
                cell.clone()
            }
            None => {
                let cell = Arc::new(Flight::new());
                in_flight.insert(key.to_string(), cell.clone());
                cell
            }
        };

        Ok(FlightGuard {
            in_flight: &self.in_flight,
            key,
            cell,
        })
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }
}

/// A caller's membership in an in-flight fetch
///
/// Dropping the guard removes the flight from the map once it has finished,
/// or when the last caller waiting on it goes away, so cancelled callers do
/// not leave entries behind.
struct FlightGuard<'a> {
    in_flight: &'a InFlight,
    key: &'a str,
    cell: Arc<Flight>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            let is_current = in_flight
                .get(self.key)
                .is_some_and(|cell| Arc::ptr_eq(cell, &self.cell));
            // One reference held by the map, one by this guard.
            let last_caller = Arc::strong_count(&self.cell) <= 2;

            if is_current && (self.cell.initialized() || last_caller) {
                in_flight.remove(self.key);
            }
        }
    }
}
