use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use aggregator::WindowedVwapEngine;
use market_data::CoinbaseFeed;
use vwap_engine::pipeline::{join_logged, spawn_reporter, LogSink, Pipeline, SnapshotSink};
use vwap_engine::{AppConfig, SharedEngine, SystemMetrics};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn init_logging(config: &AppConfig) {
    let (level, recognised) = config.level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !recognised {
        warn!("LogLevel {:?} not found, defaulting to INFO", config.log_level);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let config = AppConfig::load(config_path.as_deref())?;
    init_logging(&config);

    info!("====== Volume Weighted Average Price Calculation Engine v{} ======", vwap_engine::VERSION);
    info!(
        "Window size {} shared across {:?}",
        config.window_size, config.feed.product_ids
    );

    let engine: SharedEngine = Arc::new(
        WindowedVwapEngine::with_policy(Vec::new(), config.window_size, config.zero_volume_policy)
            .context("creating vwap engine")?,
    );
    let metrics = Arc::new(SystemMetrics::new());
    let shutdown = CancellationToken::new();

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_shutdown.cancel();
        }
    });

    let reporter = (config.report_interval_ms > 0).then(|| {
        spawn_reporter(
            Arc::clone(&engine),
            Duration::from_millis(config.report_interval_ms),
            shutdown.clone(),
        )
    });

    let feed = CoinbaseFeed::new(config.feed.clone());
    let (events, feed_handle) = feed.spawn(config.channel_capacity, shutdown.clone());

    let pipeline = Pipeline::new(Arc::clone(&engine), Arc::clone(&metrics))
        .report_every_trade(config.report_every_trade);
    let forwarded = pipeline.forward(events, &mut LogSink).await?;

    shutdown.cancel();
    if let Some(reporter) = reporter {
        join_logged("reporter", reporter).await;
    }
    let feed_result = feed_handle.await.context("feed task panicked")?;

    let counters = metrics.snapshot();
    info!(
        "Forwarded {} trades ({} rejected, {} evictions, {} disconnects), window {}/{}",
        forwarded,
        counters.trades_rejected,
        counters.evictions,
        counters.disconnects,
        engine.len(),
        engine.window_size()
    );
    if let Err(e) = LogSink.emit(&engine.snapshot()) {
        warn!("Failed to report final snapshot: {}", e);
    }

    feed_result.context("market data feed failed")?;
    info!("Exiting application");
    Ok(())
}
