//! Coinbase `matches` feed for the VWAP engine.
//!
//! Connects, subscribes, validates trade messages into [`aggregator::TradeEvent`]s
//! and streams them to a consumer, reconnecting with backoff when the
//! connection drops.

pub mod backoff;
pub mod config;
pub mod error;
pub mod feed;
pub mod stream;
pub mod types;

pub use config::{FeedConfig, ReconnectConfig, DEFAULT_FEED_URL};
pub use error::FeedError;
pub use feed::{CoinbaseFeed, SessionEnd};
pub use stream::{channel, FeedEvent, FeedStream};
pub use types::*;
