//! Core library for the today-weather tool.
//!
//! This crate defines:
//! - The closed error taxonomy and result algebra
//! - Input validation for coordinates and timezone
//! - A resilient gateway (retry, circuit breaker, total timeout) around one network call
//! - The Open-Meteo forecast client and its failure classification
//! - The tool adapter producing response envelopes for an agent runtime
//!
//! It is used by `weather-cli`, but can also be embedded by other hosts.

pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod provider;
pub mod telemetry;
pub mod tool;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{Error, Result, ResultExt};
pub use gateway::{BreakerRegistry, ResilientGateway, Transport};
pub use model::{TodayWeatherResult, WeatherRequest};
pub use provider::{ForecastProvider, provider_from_config};
pub use tool::{CallToolResult, WeatherTools};
