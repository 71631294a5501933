use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAX_TIMEZONE_LEN: usize = 64;

/// Validated coordinates and timezone for a single forecast lookup.
///
/// Only obtainable through [`WeatherRequest::create`], so holding one means
/// the input already passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRequest {
    latitude: f64,
    longitude: f64,
    timezone: String,
}

impl WeatherRequest {
    /// Validate untrusted input. Rules are checked in order and the first
    /// violation wins: latitude, then longitude, then timezone.
    pub fn create(latitude: f64, longitude: f64, timezone: &str) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::invalid_params("latitude must be between -90 and 90"));
        }

        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::invalid_params(
                "longitude must be between -180 and 180",
            ));
        }

        let trimmed = timezone.trim();
        if trimmed.is_empty() || timezone.chars().count() > MAX_TIMEZONE_LEN {
            return Err(Error::invalid_params(
                "timezone must be a non-empty IANA timezone",
            ));
        }

        Ok(Self {
            latitude,
            longitude,
            timezone: trimmed.to_owned(),
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }
}

/// First-day summary of a daily forecast. Series values the provider omitted
/// stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayWeatherResult {
    pub date: String,
    pub temperature_min_c: Option<f64>,
    pub temperature_max_c: Option<f64>,
    pub precipitation_sum_mm: Option<f64>,
    pub wind_speed_max_kmh: Option<f64>,
    pub timezone: Option<String>,
}
