//! Property-based tests for the windowed VWAP engine
//!
//! Every update is checked against a naive model that recomputes totals from
//! the retained events.

mod common;

use aggregator::{TradeEvent, WindowedVwapEngine, ZeroVolumePolicy, DEFAULT_WINDOW_SIZE};
use common::{assert_consistent, expected_vwap, INSTRUMENTS};
use proptest::prelude::*;
use rust_decimal::Decimal;

prop_compose! {
    fn valid_price()(mantissa in 0i64..10_000_000, scale in 2u32..=6) -> Decimal {
        Decimal::new(mantissa, scale)
    }
}

prop_compose! {
    fn valid_volume()(mantissa in 0i64..1_000_000, scale in 3u32..=8) -> Decimal {
        Decimal::new(mantissa, scale)
    }
}

prop_compose! {
    fn random_trade()(
        price in valid_price(),
        volume in valid_volume(),
        instrument in 0..INSTRUMENTS.len(),
    ) -> TradeEvent {
        TradeEvent::new(price, volume, INSTRUMENTS[instrument])
    }
}

prop_compose! {
    fn any_decimal()(mantissa in any::<i64>(), scale in 0u32..=28) -> Decimal {
        Decimal::new(mantissa, scale)
    }
}

fn random_policy() -> impl Strategy<Value = ZeroVolumePolicy> {
    prop_oneof![Just(ZeroVolumePolicy::Retain), Just(ZeroVolumePolicy::Clear)]
}

proptest! {
    #[test]
    fn fuzz_window_holds_most_recent_events(
        window_size in 1usize..16,
        trades in prop::collection::vec(random_trade(), 0..64),
    ) {
        let engine = WindowedVwapEngine::new(Vec::new(), window_size).unwrap();

        for (i, trade) in trades.iter().enumerate() {
            let evicted = engine.update(trade.clone()).unwrap();

            let expected_len = (i + 1).min(window_size);
            prop_assert_eq!(engine.len(), expected_len);
            prop_assert_eq!(evicted.is_some(), i >= window_size);
            if i >= window_size {
                prop_assert_eq!(evicted.as_ref(), Some(&trades[i - window_size]));
            }

            let start = (i + 1).saturating_sub(window_size);
            prop_assert_eq!(engine.events(), trades[start..=i].to_vec());
        }
    }

    #[test]
    fn fuzz_totals_and_vwap_match_recomputation(
        window_size in 1usize..16,
        policy in random_policy(),
        trades in prop::collection::vec(random_trade(), 1..64),
    ) {
        let engine = WindowedVwapEngine::with_policy(Vec::new(), window_size, policy).unwrap();

        for trade in trades {
            engine.update(trade).unwrap();
            let state = engine.state();
            assert_consistent(&state);

            for (id, totals) in &state.totals {
                if totals.volume_sum.is_zero() {
                    if policy == ZeroVolumePolicy::Clear {
                        prop_assert!(!state.vwap.contains_key(id));
                    }
                } else {
                    prop_assert_eq!(state.vwap.get(id).copied(), expected_vwap(totals));
                }
            }
        }
    }

    #[test]
    fn fuzz_first_observation_is_price(
        history in prop::collection::vec(random_trade(), 0..32),
        price in valid_price(),
        volume in 1i64..1_000_000,
    ) {
        let engine = WindowedVwapEngine::new(history, 32).unwrap();
        let fresh = TradeEvent::new(price, Decimal::new(volume, 3), "NEW-USD");

        engine.update(fresh).unwrap();
        prop_assert_eq!(engine.vwap("NEW-USD"), Some(price));
    }

    #[test]
    fn fuzz_initial_events_replay_like_updates(
        window_size in 0usize..16,
        trades in prop::collection::vec(random_trade(), 0..16),
    ) {
        let effective = if window_size == 0 { DEFAULT_WINDOW_SIZE } else { window_size };
        let built = WindowedVwapEngine::new(trades.clone(), window_size);

        if trades.len() > effective {
            prop_assert!(built.is_err());
        } else {
            let built = built.unwrap();
            let replayed = WindowedVwapEngine::new(Vec::new(), window_size).unwrap();
            for trade in trades {
                replayed.update(trade).unwrap();
            }
            prop_assert_eq!(built.state(), replayed.state());
        }
    }

    #[test]
    fn fuzz_out_of_range_trades_leave_state_untouched(
        history in prop::collection::vec(random_trade(), 0..8),
        price in any_decimal(),
        volume in any_decimal(),
    ) {
        let engine = WindowedVwapEngine::new(Vec::new(), 4).unwrap();
        for trade in history {
            engine.update(trade).unwrap();
        }
        let before = engine.state();
        let candidate = TradeEvent::new(price, volume, INSTRUMENTS[0]);

        match candidate.validate() {
            Ok(()) => {
                prop_assert!(engine.update(candidate).is_ok());
                assert_consistent(&engine.state());
            }
            Err(expected) => {
                prop_assert_eq!(engine.update(candidate), Err(expected));
                prop_assert_eq!(engine.state(), before);
            }
        }
    }
}
