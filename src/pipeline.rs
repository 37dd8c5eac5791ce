//! Forwards feed events into the engine and renders snapshots.

use crate::metrics::{LatencyTimer, SystemMetrics};
use aggregator::{TradeEvent, VwapError, VwapSnapshot, WindowedVwapEngine};
use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use market_data::FeedEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Destination for rendered VWAP snapshots.
pub trait SnapshotSink {
    fn emit(&mut self, snapshot: &VwapSnapshot) -> Result<()>;
}

/// Logs each snapshot as a JSON object of instrument to VWAP.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl SnapshotSink for LogSink {
    fn emit(&mut self, snapshot: &VwapSnapshot) -> Result<()> {
        let rendered = serde_json::to_string(snapshot).context("rendering snapshot")?;
        info!("{}", rendered);
        Ok(())
    }
}

/// Keeps every emitted snapshot.
#[derive(Debug, Default, Clone)]
pub struct CollectSink {
    pub snapshots: Vec<VwapSnapshot>,
}

impl SnapshotSink for CollectSink {
    fn emit(&mut self, snapshot: &VwapSnapshot) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}

pub struct Pipeline {
    engine: Arc<WindowedVwapEngine>,
    metrics: Arc<SystemMetrics>,
    report_every_trade: bool,
}

impl Pipeline {
    pub fn new(engine: Arc<WindowedVwapEngine>, metrics: Arc<SystemMetrics>) -> Self {
        Self {
            engine,
            metrics,
            report_every_trade: true,
        }
    }

    pub fn report_every_trade(mut self, enabled: bool) -> Self {
        self.report_every_trade = enabled;
        self
    }

    pub fn engine(&self) -> &Arc<WindowedVwapEngine> {
        &self.engine
    }

    /// Feeds one trade into the engine and records it. Trades the engine
    /// cannot hold exactly are counted as rejected and leave it unchanged.
    pub fn apply(&self, trade: TradeEvent) -> Result<Option<TradeEvent>, VwapError> {
        let instrument = trade.instrument_id.clone();
        let timer = LatencyTimer::start("update");
        let outcome = self.engine.update(trade);
        timer.finish(&self.metrics);

        let evicted = match outcome {
            Ok(evicted) => evicted,
            Err(e) => {
                self.metrics.record_rejected();
                warn!("Engine rejected trade: {}", e);
                return Err(e);
            }
        };

        if let Some(old) = &evicted {
            debug!("Evicted {} trade: {} @ {}", old.instrument_id, old.volume, old.price);
        }
        self.metrics.record_trade(
            &instrument,
            self.engine.vwap(&instrument),
            self.engine.len(),
            evicted.is_some(),
        );
        Ok(evicted)
    }

    /// Drains `events` in arrival order. Returns how many trades reached the
    /// engine once the stream ends.
    pub async fn forward<S, K>(&self, mut events: S, sink: &mut K) -> Result<u64>
    where
        S: Stream<Item = FeedEvent> + Unpin,
        K: SnapshotSink + ?Sized,
    {
        let mut forwarded = 0u64;

        while let Some(event) = events.next().await {
            match event {
                FeedEvent::Trade(trade) => {
                    if self.apply(trade).is_err() {
                        continue;
                    }
                    forwarded += 1;
                    if self.report_every_trade {
                        sink.emit(&self.engine.snapshot())?;
                    }
                }
                FeedEvent::Rejected(reason) => {
                    self.metrics.record_rejected();
                    warn!("Trade rejected by feed: {}", reason);
                }
                FeedEvent::Connected => {
                    info!("Market data feed connected");
                }
                FeedEvent::Disconnected => {
                    self.metrics.record_disconnect();
                    warn!("Market data feed disconnected");
                }
            }
        }

        Ok(forwarded)
    }
}

/// Logs a snapshot every `every` until `shutdown` fires.
pub fn spawn_reporter(
    engine: Arc<WindowedVwapEngine>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        let mut sink = LogSink;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    info!("Window occupancy: {}/{}", engine.len(), engine.window_size());
                    if let Err(e) = sink.emit(&engine.snapshot()) {
                        warn!("Failed to report snapshot: {}", e);
                    }
                }
            }
        }
    })
}

/// Waits for a background task, logging a panic or cancellation instead of
/// propagating it. Returns whether the task finished cleanly.
pub async fn join_logged(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!("{} task failed: {}", name, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use rust_decimal_macros::dec;

    fn pipeline(window_size: usize) -> Pipeline {
        let engine = Arc::new(WindowedVwapEngine::new(Vec::new(), window_size).unwrap());
        Pipeline::new(engine, Arc::new(SystemMetrics::new()))
    }

    #[tokio::test]
    async fn test_forward_updates_engine_and_sink() {
        let pipeline = pipeline(4);
        let events = vec![
            FeedEvent::Connected,
            FeedEvent::Trade(TradeEvent::new(dec!(10), dec!(10), "BTC-USD")),
            FeedEvent::Rejected("invalid price".to_string()),
            FeedEvent::Trade(TradeEvent::new(dec!(20), dec!(30), "BTC-USD")),
            FeedEvent::Disconnected,
        ];
        let mut sink = CollectSink::default();

        let forwarded = pipeline
            .forward(stream::iter(events), &mut sink)
            .await
            .unwrap();

        assert_eq!(forwarded, 2);
        assert_eq!(sink.snapshots.len(), 2);
        assert_eq!(sink.snapshots[0]["BTC-USD"], dec!(10));
        assert_eq!(sink.snapshots[1]["BTC-USD"], dec!(17.5));

        let counters = pipeline.metrics.snapshot();
        assert_eq!(counters.trades_processed, 2);
        assert_eq!(counters.trades_rejected, 1);
        assert_eq!(counters.disconnects, 1);
    }

    #[tokio::test]
    async fn test_forward_without_per_trade_reports() {
        let pipeline = pipeline(2).report_every_trade(false);
        let events = (1..=3).map(|i| {
            FeedEvent::Trade(TradeEvent::new(rust_decimal::Decimal::from(i), dec!(1), "ETH-USD"))
        });
        let mut sink = CollectSink::default();

        let forwarded = pipeline
            .forward(stream::iter(events), &mut sink)
            .await
            .unwrap();

        assert_eq!(forwarded, 3);
        assert!(sink.snapshots.is_empty());
        assert_eq!(pipeline.engine().len(), 2);
        assert_eq!(pipeline.engine().vwap("ETH-USD"), Some(dec!(2.5)));
        assert_eq!(pipeline.metrics.snapshot().evictions, 1);
    }

    #[test]
    fn test_log_sink_renders_json() {
        let mut snapshot = VwapSnapshot::new();
        snapshot.insert("BTC-USD".to_string(), dec!(17.5));
        assert!(LogSink.emit(&snapshot).is_ok());
    }

    #[tokio::test]
    async fn test_reporter_stops_on_shutdown() {
        let engine = Arc::new(WindowedVwapEngine::new(Vec::new(), 0).unwrap());
        let shutdown = CancellationToken::new();
        let handle = spawn_reporter(engine, Duration::from_millis(5), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(1), join_logged("reporter", handle))
            .await
            .unwrap();
        assert!(joined);
    }

    #[tokio::test]
    async fn test_join_logged_reports_failed_task() {
        let handle = tokio::spawn(async { panic!("reporter crashed") });
        assert!(!join_logged("reporter", handle).await);

        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        assert!(!join_logged("reporter", handle).await);
    }

    #[tokio::test]
    async fn test_engine_rejection_counts_and_skips_trade() {
        let pipeline = pipeline(4);
        let events = vec![
            FeedEvent::Trade(TradeEvent::new(dec!(10), dec!(1), "BTC-USD")),
            FeedEvent::Trade(TradeEvent::new(
                dec!(100000000000000),
                dec!(1000000000000000),
                "BTC-USD",
            )),
            FeedEvent::Trade(TradeEvent::new(dec!(20), dec!(1), "BTC-USD")),
        ];
        let mut sink = CollectSink::default();

        let forwarded = pipeline
            .forward(stream::iter(events), &mut sink)
            .await
            .unwrap();

        assert_eq!(forwarded, 2);
        assert_eq!(sink.snapshots.len(), 2);
        assert_eq!(pipeline.engine().len(), 2);
        assert_eq!(pipeline.engine().vwap("BTC-USD"), Some(dec!(15)));

        let counters = pipeline.metrics.snapshot();
        assert_eq!(counters.trades_processed, 2);
        assert_eq!(counters.trades_rejected, 1);
    }
}
