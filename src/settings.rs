// Runtime configuration: defaults -> bookheat.toml -> BOOKHEAT_* env -> CLI

use std::path::Path;
use std::time::Duration;

use ::config::{Config, Environment, File};
use rand::Rng;
use serde::Deserialize;

use crate::history::HistoryConfig;
use crate::market_data::adapters::VenueKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("symbol must not be empty")]
    EmptySymbol,
    #[error("{venue} does not stream depth {depth} (supported: {supported:?})")]
    UnsupportedDepth { venue: VenueKind, depth: u32, supported: &'static [u32] },
    #[error("history window must be longer than zero seconds")]
    ZeroWindow,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub venue: VenueKind,
    pub symbol: String,
    /// Levels per book message; the venue default when unset.
    pub depth: Option<u32>,
    pub max_age_secs: u64,
    /// Expected book cadence; the venue estimate when unset.
    pub update_interval_ms: Option<u64>,
    pub trade_capacity: usize,
    pub channel_capacity: usize,
    pub log_filter: String,
    pub reconnect: ReconnectConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            venue: VenueKind::BybitLinear,
            symbol: "BTCUSDT".into(),
            depth: None,
            max_age_secs: 30,
            update_interval_ms: None,
            trade_capacity: 1000,
            channel_capacity: 1024,
            log_filter: "info,bookheat_rs=debug".into(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl AppConfig {
    /// Layer `path` (or `./bookheat.toml` when present) and the environment
    /// over the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name("bookheat").required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("BOOKHEAT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::EmptySymbol);
        }
        let depth = self.depth();
        let supported = self.venue.supported_depths();
        if !supported.contains(&depth) {
            return Err(ConfigError::UnsupportedDepth { venue: self.venue, depth, supported });
        }
        if self.max_age_secs == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }

    pub fn depth(&self) -> u32 {
        self.depth.unwrap_or_else(|| self.venue.default_depth())
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// History sizing for an adapter whose book channel pushes every
    /// `update_interval` (overridden by `update_interval_ms`).
    pub fn history_config(&self, update_interval: Duration) -> HistoryConfig {
        let update_interval = self.update_interval_ms.map(Duration::from_millis).unwrap_or(update_interval);
        HistoryConfig {
            max_age: self.max_age(),
            update_interval,
            depth: self.depth(),
            trade_capacity: self.trade_capacity,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 0 retries forever.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { enabled: true, base_delay_ms: 250, max_delay_ms: 10_000, max_attempts: 0 }
    }
}

impl ReconnectConfig {
    /// Back-off before retry `attempt` (0-based): `min(base * 2^attempt, max)`
    /// plus up to a quarter of that again as jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.min(20));
        let capped = exp.min(self.max_delay_ms);
        let jitter = if capped >= 4 { rand::thread_rng().gen_range(0..=capped / 4) } else { 0 };
        Duration::from_millis(capped + jitter)
    }
}
