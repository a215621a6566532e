//! skycache library
//!
//! Cache-aside access to the Open-Meteo forecast endpoint. Throttled
//! requests are retried with exponential backoff and, when retries run out,
//! answered from the most recent stale cache entry.

pub mod cache;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod fetcher;
pub mod forecast;
pub mod logging;
pub mod request;

pub use cache::{CacheEntry, CacheStore, CacheStoreError, DiskStore, MemoryStore};
pub use config::{RetryPolicy, ServiceConfig};
pub use coordinator::{CacheCoordinator, FetchFailure, FetchResult, Source};
pub use fetcher::{Outcome, RetryingFetcher, ThrottleError, UpstreamError};
pub use request::{build_url, generate_cache_key, ParamValue, QueryParams};
