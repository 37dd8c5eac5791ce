//! Shared invariant checks for the integration tests

#![allow(dead_code)]

use aggregator::{EngineState, InstrumentTotals, TradeEvent, DIVISION_PRECISION};
use rust_decimal::{Decimal, RoundingStrategy};

pub const INSTRUMENTS: [&str; 4] = ["BTC-USD", "ETH-USD", "ETH-BTC", "SOL-USD"];

pub fn expected_vwap(totals: &InstrumentTotals) -> Option<Decimal> {
    if totals.volume_sum.is_zero() {
        return None;
    }
    Some(
        (totals.weighted_sum / totals.volume_sum)
            .round_dp_with_strategy(DIVISION_PRECISION, RoundingStrategy::MidpointAwayFromZero),
    )
}

pub fn trade(price: i64, price_scale: u32, volume: i64, volume_scale: u32, id: &str) -> TradeEvent {
    TradeEvent::new(Decimal::new(price, price_scale), Decimal::new(volume, volume_scale), id)
}

/// Panics unless `state` satisfies every engine invariant.
pub fn assert_consistent(state: &EngineState) {
    assert!(
        state.events.len() <= state.window_size,
        "window holds {} events, capacity {}",
        state.events.len(),
        state.window_size
    );

    let recomputed = state
        .recompute_totals()
        .expect("windowed events must be representable");
    for (id, totals) in &state.totals {
        let expected = recomputed.get(id).copied().unwrap_or_default();
        assert_eq!(*totals, expected, "running totals drifted for {}", id);
    }
    for id in recomputed.keys() {
        assert!(state.totals.contains_key(id), "no totals for windowed {}", id);
    }

    for (id, totals) in &state.totals {
        if let Some(expected) = expected_vwap(totals) {
            assert_eq!(state.vwap.get(id), Some(&expected), "vwap mismatch for {}", id);
        }
    }
}
