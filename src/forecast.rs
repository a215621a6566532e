//! Forecast request model
//!
//! Validates coordinates and builds the fixed parameter set sent to the
//! Open-Meteo `/forecast` endpoint.

use thiserror::Error;

use crate::request::QueryParams;

/// Default latitude (Berlin)
pub const DEFAULT_LATITUDE: f64 = 52.52;

/// Default longitude (Berlin)
pub const DEFAULT_LONGITUDE: f64 = 13.41;

/// Errors raised for out-of-range coordinates
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid latitude. Must be between -90 and 90.")]
    InvalidLatitude(f64),

    #[error("Invalid longitude. Must be between -180 and 180.")]
    InvalidLongitude(f64),
}

/// A validated forecast request for one location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastRequest {
    latitude: f64,
    longitude: f64,
}

impl Default for ForecastRequest {
    fn default() -> Self {
        Self {
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
        }
    }
}

impl ForecastRequest {
    /// Creates a request, rejecting coordinates outside the valid range
    ///
    /// # Returns
    /// * `Ok(ForecastRequest)` if both coordinates are finite and in range
    /// * `Err(ValidationError)` naming the first offending coordinate
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::InvalidLongitude(longitude));
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Query parameters for the upstream forecast endpoint
    pub fn to_params(&self) -> QueryParams {
        QueryParams::new()
            .with("latitude", self.latitude)
            .with("longitude", self.longitude)
            .with("hourly", "temperature_2m")
            .with("current", "temperature_2m")
            .with("forecast_days", 1)
    }
}
