//! Open-Meteo daily forecast client.
//!
//! Every failure is classified here, exactly once, into [`Error`]. Messages
//! are fixed strings; provider bodies and transport errors never leak into
//! them.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    gateway::{GatewayFailure, ProviderRequest, RawResponse, Transport},
    model::{TodayWeatherResult, WeatherRequest},
};

use super::ForecastProvider;

pub const FORECAST_PATH: &str = "v1/forecast";
pub const DAILY_FIELDS: &str =
    "temperature_2m_max,temperature_2m_min,precipitation_sum,wind_speed_10m_max";

const MSG_REQUEST_FAILED: &str = "Weather provider request failed.";
const MSG_TIMED_OUT: &str = "Weather provider request timed out.";
const MSG_RATE_LIMITED: &str = "Weather provider rate-limited the request.";
const MSG_NON_SUCCESS: &str = "Weather provider returned a non-success response.";
const MSG_INVALID_JSON: &str = "Weather provider returned invalid JSON.";
const MSG_EMPTY: &str = "Weather provider returned empty forecast data.";
const MSG_UNBUILDABLE: &str = "Weather provider request could not be built.";

/// Forecast client over any [`Transport`], normally a
/// [`crate::gateway::ResilientGateway`].
#[derive(Debug)]
pub struct OpenMeteoClient<G> {
    gateway: G,
}

impl<G: Transport> OpenMeteoClient<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}

/// `GET v1/forecast` for the request's coordinates and timezone.
pub fn forecast_request(request: &WeatherRequest) -> ProviderRequest {
    ProviderRequest {
        path: FORECAST_PATH.to_owned(),
        query: vec![
            ("latitude".to_owned(), request.latitude().to_string()),
            ("longitude".to_owned(), request.longitude().to_string()),
            ("daily".to_owned(), DAILY_FIELDS.to_owned()),
            ("timezone".to_owned(), request.timezone().to_owned()),
        ],
    }
}

#[async_trait]
impl<G: Transport> ForecastProvider for OpenMeteoClient<G> {
    async fn get_today(
        &self,
        request: &WeatherRequest,
        cancel: &CancellationToken,
    ) -> Result<TodayWeatherResult> {
        let outcome = self.gateway.send(&forecast_request(request), cancel).await;
        match outcome {
            Ok(response) => classify_response(response),
            Err(failure) => Err(classify_failure(failure)),
        }
    }
}

fn classify_failure(failure: GatewayFailure) -> Error {
    warn!(reason = %failure, "weather provider call produced no response");
    match failure {
        GatewayFailure::TimeoutElapsed => Error::timeout(MSG_TIMED_OUT),
        // An open circuit is reported like any other failed request, and so is
        // the caller's own cancellation: neither is the total budget elapsing.
        GatewayFailure::TransientNetworkError
        | GatewayFailure::CircuitOpen
        | GatewayFailure::Cancelled => Error::upstream(MSG_REQUEST_FAILED),
        GatewayFailure::InvalidRequest => Error::unexpected(MSG_UNBUILDABLE),
    }
}

fn classify_response(response: RawResponse) -> Result<TodayWeatherResult> {
    let status = response.status;

    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!(
            retry_after_seconds = response.retry_after_seconds,
            "weather provider rate-limited the request"
        );
        return Err(Error::upstream_status(
            MSG_RATE_LIMITED,
            status.as_u16(),
            response.retry_after_seconds,
        ));
    }

    if !status.is_success() {
        warn!(status = status.as_u16(), "weather provider returned non-success status");
        return Err(Error::upstream_status(MSG_NON_SUCCESS, status.as_u16(), None));
    }

    let parsed: Option<ForecastDto> = serde_json::from_slice(&response.body).map_err(|error| {
        warn!(%error, "weather provider body did not match the forecast shape");
        Error::upstream(MSG_INVALID_JSON)
    })?;

    let today = parsed.and_then(ForecastDto::into_today).ok_or_else(|| {
        warn!("weather provider returned no daily entries");
        Error::upstream(MSG_EMPTY)
    })?;

    debug!(date = %today.date, "parsed today's forecast");
    Ok(today)
}

#[derive(Debug, Deserialize)]
struct ForecastDto {
    timezone: Option<String>,
    daily: Option<DailyDto>,
}

/// Series may be missing entirely or hold `null` entries.
#[derive(Debug, Deserialize)]
struct DailyDto {
    time: Option<Vec<String>>,
    temperature_2m_min: Option<Vec<Option<f64>>>,
    temperature_2m_max: Option<Vec<Option<f64>>>,
    precipitation_sum: Option<Vec<Option<f64>>>,
    wind_speed_10m_max: Option<Vec<Option<f64>>>,
}

impl ForecastDto {
    /// First day of the forecast, or `None` when `daily.time` is absent or empty.
    fn into_today(self) -> Option<TodayWeatherResult> {
        let daily = self.daily?;
        let date = daily.time?.into_iter().next()?;

        Some(TodayWeatherResult {
            date,
            temperature_min_c: first(daily.temperature_2m_min),
            temperature_max_c: first(daily.temperature_2m_max),
            precipitation_sum_mm: first(daily.precipitation_sum),
            wind_speed_max_kmh: first(daily.wind_speed_10m_max),
            timezone: self.timezone,
        })
    }
}

fn first(series: Option<Vec<Option<f64>>>) -> Option<f64> {
    series?.first().copied().flatten()
}
