use std::{fmt::Debug, sync::Arc};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    Config,
    error::Result,
    gateway::{BreakerRegistry, ResilientGateway},
    model::{TodayWeatherResult, WeatherRequest},
    provider::{http::ReqwestTransport, open_meteo::OpenMeteoClient},
};

pub mod http;
pub mod open_meteo;

/// Source of today's forecast for a validated request.
///
/// Implementations classify every failure into [`crate::Error`] themselves;
/// callers never re-classify.
#[async_trait]
pub trait ForecastProvider: Send + Sync + Debug {
    async fn get_today(
        &self,
        request: &WeatherRequest,
        cancel: &CancellationToken,
    ) -> Result<TodayWeatherResult>;
}

#[async_trait]
impl<P: ForecastProvider + ?Sized> ForecastProvider for Arc<P> {
    async fn get_today(
        &self,
        request: &WeatherRequest,
        cancel: &CancellationToken,
    ) -> Result<TodayWeatherResult> {
        (**self).get_today(request, cancel).await
    }
}

pub type DefaultProvider = OpenMeteoClient<ResilientGateway<ReqwestTransport>>;

/// Build the Open-Meteo client over the reqwest transport, wrapped in the
/// resilience policies from `config`. The breaker comes from `breakers`, keyed
/// by the provider host, so every client built against the same registry and
/// host shares one health state.
pub fn provider_from_config(
    config: &Config,
    breakers: &BreakerRegistry,
) -> anyhow::Result<DefaultProvider> {
    config.validate()?;

    let base_url = config.provider.base_url()?;
    let target = base_url
        .host_str()
        .ok_or_else(|| anyhow!("Provider base URL '{base_url}' has no host"))?
        .to_owned();

    let transport = ReqwestTransport::new(base_url, &config.provider.user_agent)
        .context("Failed to build HTTP client for weather provider")?;
    let gateway = ResilientGateway::new(
        transport,
        config.resilience.settings(),
        breakers.breaker_for(&target),
    );

    Ok(OpenMeteoClient::new(gateway))
}
