use crate::error::VwapError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-instrument VWAP values, ordered by instrument id.
pub type VwapSnapshot = BTreeMap<String, Decimal>;

/// Most fractional digits a trade may carry across price and volume combined.
pub const MAX_TRADE_SCALE: u32 = 16;

/// Exclusive bound on the volume and the notional of a single trade.
pub const MAX_TRADE_MAGNITUDE: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

/// A single executed trade as seen by the engine.
///
/// The engine accepts trades that pass [`validate`](Self::validate): both
/// values non-negative, at most [`MAX_TRADE_SCALE`] fractional digits between
/// them, and volume and notional below [`MAX_TRADE_MAGNITUDE`]. Inside that
/// range every windowed sum fits the 96-bit mantissa of [`Decimal`] without
/// rounding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeEvent {
    pub price: Decimal,
    pub volume: Decimal,
    pub instrument_id: String,
}

impl TradeEvent {
    #[inline]
    pub fn new(price: Decimal, volume: Decimal, instrument_id: impl Into<String>) -> Self {
        Self {
            price,
            volume,
            instrument_id: instrument_id.into(),
        }
    }

    /// `price * volume`, or `None` when the product cannot be held exactly.
    #[inline]
    pub fn notional(&self) -> Option<Decimal> {
        let notional = self.price.checked_mul(self.volume)?;
        let exact = if notional.is_zero() {
            self.price.is_zero() || self.volume.is_zero()
        } else {
            notional.scale() == self.price.scale() + self.volume.scale()
        };
        exact.then_some(notional)
    }

    /// Checks that the trade lies in the range where running totals stay exact.
    pub fn validate(&self) -> Result<(), VwapError> {
        for (field, value) in [("price", self.price), ("volume", self.volume)] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(VwapError::Negative {
                    instrument_id: self.instrument_id.clone(),
                    field,
                    value,
                });
            }
        }

        let scale = self.price.scale() + self.volume.scale();
        if scale > MAX_TRADE_SCALE {
            return Err(VwapError::Precision {
                instrument_id: self.instrument_id.clone(),
                scale,
                max: MAX_TRADE_SCALE,
            });
        }

        let notional = self
            .notional()
            .ok_or_else(|| VwapError::overflow(&self.instrument_id))?;
        for (field, value) in [("volume", self.volume), ("notional", notional)] {
            if value >= MAX_TRADE_MAGNITUDE {
                return Err(VwapError::Magnitude {
                    instrument_id: self.instrument_id.clone(),
                    field,
                    value,
                    max: MAX_TRADE_MAGNITUDE,
                });
            }
        }
        Ok(())
    }
}

/// `a + b` (or `a - b`), or `None` if the result overflows or had to be
/// rounded to fit.
fn exact_sum(a: Decimal, b: Decimal, subtract: bool) -> Option<Decimal> {
    let sum = if subtract {
        a.checked_sub(b)?
    } else {
        a.checked_add(b)?
    };
    if a.is_zero() || b.is_zero() || sum.is_zero() || sum.scale() >= a.scale().max(b.scale()) {
        Some(sum)
    } else {
        None
    }
}

/// Running totals for one instrument over the events currently in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstrumentTotals {
    pub weighted_sum: Decimal,
    pub volume_sum: Decimal,
}

impl InstrumentTotals {
    /// Totals with `event` added, or `None` if they cannot be held exactly.
    #[inline]
    pub fn checked_add(&self, event: &TradeEvent) -> Option<Self> {
        Some(Self {
            weighted_sum: exact_sum(self.weighted_sum, event.notional()?, false)?,
            volume_sum: exact_sum(self.volume_sum, event.volume, false)?,
        })
    }

    /// Totals with `event` taken out, or `None` if they cannot be held exactly.
    #[inline]
    pub fn checked_subtract(&self, event: &TradeEvent) -> Option<Self> {
        Some(Self {
            weighted_sum: exact_sum(self.weighted_sum, event.notional()?, true)?,
            volume_sum: exact_sum(self.volume_sum, event.volume, true)?,
        })
    }
}

/// What happens to an instrument's VWAP once its windowed volume falls to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroVolumePolicy {
    /// Leave the last computed value visible.
    #[default]
    Retain,
    /// Drop the instrument from the VWAP map.
    Clear,
}

/// Consistent copy of the complete engine state, taken under one lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub window_size: usize,
    pub events: Vec<TradeEvent>,
    pub totals: BTreeMap<String, InstrumentTotals>,
    pub vwap: VwapSnapshot,
}

impl EngineState {
    /// Recompute totals from `events` alone, ignoring the engine's running sums.
    pub fn recompute_totals(&self) -> Result<BTreeMap<String, InstrumentTotals>, VwapError> {
        let mut totals: BTreeMap<String, InstrumentTotals> = BTreeMap::new();
        for event in &self.events {
            let entry = totals.entry(event.instrument_id.clone()).or_default();
            *entry = entry
                .checked_add(event)
                .ok_or_else(|| VwapError::overflow(&event.instrument_id))?;
        }
        Ok(totals)
    }
}
