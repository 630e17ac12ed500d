use crate::errors::{Error, Result};
use crate::forecast::{DEFAULT_HORIZON_HOURS, DEFAULT_MIN_HISTORY};
use crate::insight::DEFAULT_ENDPOINT;
use clap::{Args, Parser, Subcommand};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "forecaster", version, about = "Forecast and insight routines for the telemetry store")]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreConfig,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Forecast every metric and replace the forecast table.
    Forecast(ForecastConfig),
    /// Summarise recent readings and store the text.
    Insight(InsightConfig),
}

#[derive(Debug, Clone, Args)]
pub struct StoreConfig {
    /// Base URL of the remote store.
    #[arg(long, env = "FORECASTER_STORE_URL", global = true, default_value = "http://localhost:8080/")]
    pub store_url: String,

    #[arg(long, env = "FORECASTER_TIMEOUT_SECS", global = true, default_value_t = 30)]
    pub timeout_secs: u64,
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.store_url.starts_with("http://") || self.store_url.starts_with("https://")) {
            return Err(Error::Config(format!("store URL {} must be http(s)", self.store_url)));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
pub struct ForecastConfig {
    #[arg(long, env = "FORECASTER_HORIZON_HOURS", default_value_t = DEFAULT_HORIZON_HOURS)]
    pub horizon_hours: usize,

    /// Fewer points than this in any metric aborts the run.
    #[arg(long, env = "FORECASTER_MIN_HISTORY", default_value_t = DEFAULT_MIN_HISTORY)]
    pub min_history: usize,
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<()> {
        if self.horizon_hours == 0 {
            return Err(Error::Config("horizon_hours must be greater than 0".to_string()));
        }
        if self.min_history < 3 {
            return Err(Error::Config("min_history must be at least 3".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
pub struct InsightConfig {
    #[arg(long, env = "FORECASTER_INSIGHT_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    // Environment only; keys must not show up in process listings.
    #[arg(skip)]
    pub api_key: Option<String>,

    /// Number of newest rows summarised in the prompt.
    #[arg(long, env = "FORECASTER_RECENT_ROWS", default_value_t = 48)]
    pub recent_rows: usize,
}

impl InsightConfig {
    pub const API_KEY_ENV: &'static str = "FORECASTER_INSIGHT_API_KEY";

    pub fn with_env_key(mut self) -> Self {
        self.api_key = std::env::var(Self::API_KEY_ENV).ok().filter(|key| !key.is_empty());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.recent_rows == 0 {
            return Err(Error::Config("recent_rows must be greater than 0".to_string()));
        }
        if self.api_key.is_none() {
            return Err(Error::Config(format!("{} is not set", Self::API_KEY_ENV)));
        }
        Ok(())
    }
}
