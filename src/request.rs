//! Request parameters, upstream URL joining, and cache key derivation
//!
//! Query parameters are stored in an ordered map so that their serialized form
//! is canonical: the same set of parameters always produces the same cache key,
//! regardless of the order in which the caller inserted them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Namespace tag prepended to every cache key
pub const CACHE_KEY_PREFIX: &str = "forecast_cache_";

/// A single query parameter value, either text or a number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Integer(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

/// Ordered set of query parameters sent upstream
///
/// Passed through verbatim to the upstream API; no validation happens here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, ParamValue>);

impl QueryParams {
    /// Creates an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing any previous value for the same name
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts a parameter, replacing any previous value for the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical JSON form used for cache key derivation
    fn canonical(&self) -> String {
        // BTreeMap keys are sorted, so this is stable. Serializing plain
        // strings and numbers cannot fail.
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// Joins an endpoint onto a base URL
///
/// Absolute endpoints (`http://` or `https://`) are returned unchanged.
/// Otherwise exactly one `/` separates the base and the endpoint.
pub fn build_url(base_url: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }

    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Derives the cache key for a request
///
/// The key is the namespace prefix followed by the first 128 bits of a
/// SHA-256 digest over the URL and the canonical parameter serialization,
/// hex encoded.
pub fn generate_cache_key(url: &str, params: &QueryParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(params.canonical().as_bytes());
    let digest = hasher.finalize();

    format!("{}{}", CACHE_KEY_PREFIX, hex::encode(&digest[..16]))
}
