use crate::error::FeedError;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_FEED_URL: &str = "wss://ws-feed.exchange.coinbase.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub product_ids: Vec<String>,
    pub connect_timeout_ms: u64,
    pub connect_retry_interval_ms: u64,
    pub ping_interval_secs: u64,
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Zero retries forever.
    pub max_attempts: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            product_ids: vec![
                "BTC-USD".to_string(),
                "ETH-USD".to_string(),
                "ETH-BTC".to_string(),
            ],
            connect_timeout_ms: 5_000,
            connect_retry_interval_ms: 1_000,
            ping_interval_secs: 30,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_attempts: 0,
        }
    }
}

impl FeedConfig {
    pub fn validate(&self) -> Result<(), FeedError> {
        let url = Url::parse(&self.url)
            .map_err(|e| FeedError::InvalidConfig(format!("feed url {:?}: {}", self.url, e)))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(FeedError::InvalidConfig(format!(
                "feed url must use ws or wss, got {}",
                url.scheme()
            )));
        }
        if self.product_ids.is_empty() {
            return Err(FeedError::NoProducts);
        }
        if self.product_ids.iter().any(|p| p.trim().is_empty()) {
            return Err(FeedError::InvalidConfig("empty product id".to_string()));
        }
        if self.ping_interval_secs == 0 {
            return Err(FeedError::InvalidConfig(
                "ping_interval_secs must be positive".to_string(),
            ));
        }
        if self.reconnect.initial_backoff_ms > self.reconnect.max_backoff_ms {
            return Err(FeedError::InvalidConfig(
                "initial_backoff_ms exceeds max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}
