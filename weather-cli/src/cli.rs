use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::CustomType;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use weather_core::{BreakerRegistry, CallToolResult, Config, WeatherTools, provider_from_config};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Today's weather tool host")]
pub struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Invoke `get_today_weather` and print the response envelope as JSON.
    Today {
        /// Latitude, -90..90.
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,

        /// Longitude, -180..180.
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,

        /// IANA timezone; defaults to the configured default timezone.
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Interactively set retry, circuit-breaker and timeout settings.
    Configure,

    /// Print the effective configuration as TOML.
    Config,

    /// Print the tool descriptor (name, description, input schema) as JSON.
    Schema,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Today {
                latitude,
                longitude,
                timezone,
            } => today(latitude, longitude, timezone).await,
            Command::Configure => configure(),
            Command::Config => {
                let cfg = Config::load()?;
                print!("{}", toml::to_string_pretty(&cfg)?);
                Ok(())
            }
            Command::Schema => {
                let tools = build_tools(&Config::load()?)?;
                println!("{}", serde_json::to_string_pretty(&tools.descriptor())?);
                Ok(())
            }
        }
    }
}

type Tools = WeatherTools<weather_core::provider::DefaultProvider>;

fn build_tools(cfg: &Config) -> anyhow::Result<Tools> {
    let breakers = BreakerRegistry::new(cfg.resilience.breaker_config());
    let provider = provider_from_config(cfg, &breakers)?;
    Ok(WeatherTools::new(provider).with_default_timezone(cfg.tool.default_timezone.clone()))
}

/// Host boundary: each invocation runs as its own task, Ctrl-C cancels it, and
/// a task that dies without an envelope is reported as a generic failure.
async fn today(latitude: f64, longitude: f64, timezone: Option<String>) -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let tools = Arc::new(build_tools(&cfg)?);
    let cancel = CancellationToken::new();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling weather request");
            ctrl_c.cancel();
        }
    });

    let invocation = {
        let tools = tools.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tools
                .get_today_weather(latitude, longitude, timezone.as_deref(), &cancel)
                .await
        })
    };

    let envelope = match invocation.await {
        Ok(envelope) => envelope,
        Err(join_error) => {
            error!(panicked = join_error.is_panic(), "tool invocation aborted");
            CallToolResult::internal_error()
        }
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&envelope).context("Failed to serialize envelope")?
    );
    Ok(())
}

fn configure() -> anyhow::Result<()> {
    let mut cfg = Config::load()?;
    let current = cfg.resilience.clone();

    cfg.resilience.retry_count = CustomType::<u32>::new("Retry count (0-20):")
        .with_default(current.retry_count)
        .prompt()?;
    cfg.resilience.break_duration_secs =
        CustomType::<u64>::new("Circuit-breaker break duration, seconds (1-3600):")
            .with_default(current.break_duration_secs)
            .prompt()?;
    cfg.resilience.timeout_secs = CustomType::<u64>::new("Total request timeout, seconds (1-300):")
        .with_default(current.timeout_secs)
        .prompt()?;

    let path = cfg.save()?;
    println!("Saved configuration to {}", path.display());
    Ok(())
}
