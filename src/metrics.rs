//! Metrics collection and monitoring

use metrics::{counter, gauge, histogram};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct SystemMetrics {
    trades_processed: AtomicU64,
    trades_rejected: AtomicU64,
    evictions: AtomicU64,
    disconnects: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub trades_processed: u64,
    pub trades_rejected: u64,
    pub evictions: u64,
    pub disconnects: u64,
}

impl SystemMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_trade(&self, instrument: &str, vwap: Option<Decimal>, window_len: usize, evicted: bool) {
        self.trades_processed.fetch_add(1, Ordering::Relaxed);
        counter!("vwap_trades_processed_total").increment(1);
        gauge!("vwap_window_len").set(window_len as f64);

        if evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            counter!("vwap_evictions_total").increment(1);
        }

        if let Some(value) = vwap.and_then(|v| v.to_f64()) {
            gauge!("vwap_price", "instrument" => instrument.to_string()).set(value);
        }
    }

    pub fn record_rejected(&self) {
        self.trades_rejected.fetch_add(1, Ordering::Relaxed);
        counter!("vwap_trades_rejected_total").increment(1);
    }

    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        counter!("vwap_feed_disconnects_total").increment(1);
    }

    pub fn record_latency(&self, operation: &'static str, duration_ns: u64) {
        histogram!("vwap_operation_latency_ns", "operation" => operation).record(duration_ns as f64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            trades_processed: self.trades_processed.load(Ordering::Relaxed),
            trades_rejected: self.trades_rejected.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
        }
    }
}

pub struct LatencyTimer {
    start: Instant,
    operation: &'static str,
}

impl LatencyTimer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }

    pub fn finish(self, metrics: &SystemMetrics) {
        let duration_ns = self.start.elapsed().as_nanos() as u64;
        metrics.record_latency(self.operation, duration_ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_counters() {
        let metrics = SystemMetrics::new();
        metrics.record_trade("BTC-USD", Some(dec!(17.5)), 1, false);
        metrics.record_trade("BTC-USD", Some(dec!(18)), 1, true);
        metrics.record_rejected();
        metrics.record_disconnect();

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                trades_processed: 2,
                trades_rejected: 1,
                evictions: 1,
                disconnects: 1,
            }
        );
    }

    #[test]
    fn test_latency_timer_without_recorder() {
        let metrics = SystemMetrics::new();
        let timer = LatencyTimer::start("update");
        timer.finish(&metrics);
        assert_eq!(metrics.snapshot().trades_processed, 0);
    }

    #[derive(Default)]
    struct HistogramKeys {
        keys: std::sync::Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl metrics::Recorder for HistogramKeys {
        fn describe_counter(
            &self,
            _: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
        }
        fn describe_gauge(
            &self,
            _: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
        }
        fn describe_histogram(
            &self,
            _: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
        }

        fn register_counter(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Counter {
            metrics::Counter::noop()
        }

        fn register_gauge(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
            metrics::Gauge::noop()
        }

        fn register_histogram(
            &self,
            key: &metrics::Key,
            _: &metrics::Metadata<'_>,
        ) -> metrics::Histogram {
            let labels = key
                .labels()
                .map(|l| (l.key().to_string(), l.value().to_string()))
                .collect();
            self.keys.lock().unwrap().push((key.name().to_string(), labels));
            metrics::Histogram::noop()
        }
    }

    #[test]
    fn test_latency_uses_fixed_metric_name() {
        let recorder = HistogramKeys::default();
        metrics::with_local_recorder(&recorder, || {
            let metrics = SystemMetrics::new();
            LatencyTimer::start("update").finish(&metrics);
            LatencyTimer::start("snapshot").finish(&metrics);
        });

        let keys = recorder.keys.lock().unwrap();
        assert_eq!(
            *keys,
            vec![
                (
                    "vwap_operation_latency_ns".to_string(),
                    vec![("operation".to_string(), "update".to_string())]
                ),
                (
                    "vwap_operation_latency_ns".to_string(),
                    vec![("operation".to_string(), "snapshot".to_string())]
                ),
            ]
        );
    }
}
