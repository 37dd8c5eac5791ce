//! Configuration management

use aggregator::ZeroVolumePolicy;
use anyhow::{anyhow, Context, Result};
use market_data::FeedConfig;
use serde::{Deserialize, Serialize};
use tracing::Level;

pub const DEFAULT_CONFIG_PATH: &str = "conf/app.toml";
pub const ENV_PREFIX: &str = "VWAP";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Window capacity shared by every instrument; 0 selects the engine default.
    pub window_size: usize,
    pub zero_volume_policy: ZeroVolumePolicy,
    pub log_level: String,
    pub report_every_trade: bool,
    /// Period of the background snapshot reporter; 0 disables it.
    pub report_interval_ms: u64,
    pub channel_capacity: usize,
    pub feed: FeedConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window_size: 200,
            zero_volume_policy: ZeroVolumePolicy::Retain,
            log_level: "INFO".to_string(),
            report_every_trade: true,
            report_interval_ms: 0,
            channel_capacity: 1024,
            feed: FeedConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file, then `VWAP_*` environment variables.
    ///
    /// Without an explicit `path` the default file is optional.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let required = path.is_some();
        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::with_name(path)
                    .format(::config::FileFormat::Toml)
                    .required(required),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("feed.product_ids"),
            )
            .build()
            .with_context(|| format!("loading configuration from {}", path))?;

        let config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("parsing configuration from {}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a TOML document layered over the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = ::config::Config::builder()
            .add_source(::config::File::from_str(content, ::config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.feed
            .validate()
            .map_err(|e| anyhow!("feed configuration: {}", e))?;
        if self.channel_capacity == 0 {
            return Err(anyhow!("channel_capacity must be positive"));
        }
        Ok(())
    }

    /// The configured log level, and whether it was recognised. Unknown
    /// values fall back to INFO.
    pub fn level(&self) -> (Level, bool) {
        match self.log_level.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => (Level::DEBUG, true),
            "INFO" => (Level::INFO, true),
            "WARN" => (Level::WARN, true),
            "ERROR" => (Level::ERROR, true),
            _ => (Level::INFO, false),
        }
    }
}
