use std::fmt;

use anyhow::Result;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder};
use serde::Deserialize;

use crate::constants::{DEFAULT_RECHECK_INTERVAL_SECS, DISCORD_API_BASE};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub discord: DiscordConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub schedules: Vec<ScheduleSeed>,
}

#[derive(Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: Option<String>,
    pub api_base: String,
}

impl fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// JSON snapshot file. Schedules and events live only in memory when unset.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub recheck_interval_secs: u64,
}

impl SchedulerConfig {
    /// ## Summary
    /// Returns the fallback re-check interval as a `chrono` delta.
    #[must_use]
    pub fn recheck_interval(&self) -> chrono::TimeDelta {
        i64::try_from(self.recheck_interval_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// A schedule declared in configuration and created on first start.
///
/// Values are kept as raw strings; they are validated when the schedule is created.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSeed {
    pub channel: u64,
    pub calendar_user: u64,
    pub event_day: String,
    pub event_time: String,
    pub timezone: String,
    #[serde(default)]
    pub message: String,
    pub post_time: Option<String>,
    pub post_offset_days: Option<u32>,
    pub cadence: Option<String>,
    pub log_channel: Option<u64>,
}

fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("discord.api_base", DISCORD_API_BASE)?
        .set_default("scheduler.recheck_interval_secs", DEFAULT_RECHECK_INTERVAL_SECS)?
        .set_default("logging.level", "info")?)
}

impl Settings {
    /// ## Summary
    /// Loads configuration from environment variables and `config.toml`.
    /// Environment variables use the `FNF_` prefix and `__` between nesting levels,
    /// e.g. `FNF_DISCORD__TOKEN`.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails.
    pub fn load() -> Result<Self> {
        Ok(builder_with_defaults()?
            .add_source(config::File::with_name("config.toml").required(false))
            .add_source(
                config::Environment::with_prefix("FNF")
                    .prefix_separator("_")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Settings>()?)
    }

    /// ## Summary
    /// Builds settings from a TOML document layered over the defaults.
    ///
    /// ## Errors
    /// Returns an error if the document is not valid TOML or does not match `Settings`.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Ok(builder_with_defaults()?
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize::<Settings>()?)
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> Result<Settings> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Failed to read .env file"),
    }

    Settings::load()
}
