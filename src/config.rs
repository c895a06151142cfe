use config::{Config, File};
pub use config::ConfigError;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::take_order::PaperConfig;

/// Main configuration struct
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Trading account
    pub trader: TraderConfig,
    /// Fill defaults applied to every request
    #[serde(default)]
    pub engine: EngineConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// Paper exchange seed state
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Deserialize)]
pub struct TraderConfig {
    /// Account address (hex string)
    pub address: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct EngineConfig {
    /// Trading fee rate, e.g. "0.01" for 1%
    #[serde(default)]
    pub fee_rate: Decimal,
    /// Never rest residual orders on the book
    #[serde(default)]
    pub do_not_make_orders: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from a configuration file
    pub fn new(config_path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            // Environment overrides the file, e.g. TAKE_ORDER_TRADER__ADDRESS=0x...
            .add_source(config::Environment::with_prefix("TAKE_ORDER").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
