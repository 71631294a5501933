use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, ops::RangeInclusive, path::PathBuf, time::Duration};
use url::Url;

use crate::gateway::{Backoff, BreakerConfig, ResilienceSettings, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/";
pub const DEFAULT_TIMEZONE: &str = "Europe/Kyiv";

const RETRY_COUNT_RANGE: RangeInclusive<u32> = 0..=20;
const BREAK_DURATION_RANGE: RangeInclusive<u64> = 1..=3600;
const TIMEOUT_RANGE: RangeInclusive<u64> = 1..=300;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Where and how to reach the forecast provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            user_agent: concat!("weather-mcp/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl ProviderConfig {
    /// Parsed base URL, always ending in `/` so relative paths join under it.
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.base_url.trim().to_owned();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).with_context(|| format!("Invalid provider base_url '{}'", self.base_url))
    }
}

/// Retry, circuit-breaker and total-timeout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Additional attempts after the first, 0..=20.
    pub retry_count: u32,
    /// How long the breaker stays open, 1..=3600 seconds.
    pub break_duration_secs: u64,
    /// Budget for one logical call including retries, 1..=300 seconds.
    pub timeout_secs: u64,
    /// First backoff delay; doubles per retry up to two seconds.
    pub retry_base_delay_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry_count: 3,
            break_duration_secs: 30,
            timeout_secs: 5,
            retry_base_delay_ms: 200,
        }
    }
}

impl ResilienceConfig {
    pub fn settings(&self) -> ResilienceSettings {
        ResilienceSettings {
            retry: RetryPolicy {
                max_retries: self.retry_count as usize,
                backoff: Backoff::exponential(
                    Duration::from_millis(self.retry_base_delay_ms),
                    2.0,
                    MAX_RETRY_DELAY,
                ),
            },
            total_timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig::with_break_duration(Duration::from_secs(self.break_duration_secs))
    }
}

/// Tool-facing defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub default_timezone: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            default_timezone: DEFAULT_TIMEZONE.to_owned(),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [resilience]
/// retry_count = 3
/// break_duration_secs = 30
/// timeout_secs = 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub resilience: ResilienceConfig,
    pub tool: ToolConfig,
}

impl Config {
    /// Reject out-of-range settings before anything is built from them.
    pub fn validate(&self) -> Result<()> {
        let r = &self.resilience;
        check_range("resilience.retry_count", r.retry_count, &RETRY_COUNT_RANGE)?;
        check_range(
            "resilience.break_duration_secs",
            r.break_duration_secs,
            &BREAK_DURATION_RANGE,
        )?;
        check_range("resilience.timeout_secs", r.timeout_secs, &TIMEOUT_RANGE)?;

        self.provider.base_url()?;
        if self.tool.default_timezone.trim().is_empty() {
            bail!("tool.default_timezone must not be empty");
        }
        Ok(())
    }

    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-task", "weather-mcp")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

fn check_range<T>(name: &str, value: T, range: &RangeInclusive<T>) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(anyhow!(
            "{name} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        ))
    }
}
