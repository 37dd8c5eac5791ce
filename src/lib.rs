//! # VWAP Engine: windowed volume-weighted average prices over a live feed
//!
//! - Count-bounded trade window shared across instruments
//! - Exact decimal running totals, consistent under concurrent access
//! - Coinbase `matches` ingestion with reconnect and backoff
//! - Snapshot reporting through structured logs

pub mod config;
pub mod metrics;
pub mod pipeline;

pub use aggregator;
pub use market_data;

pub use config::AppConfig;
pub use metrics::SystemMetrics;
pub use pipeline::{CollectSink, LogSink, Pipeline, SnapshotSink};

use std::sync::Arc;

pub type SharedEngine = Arc<aggregator::WindowedVwapEngine>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
