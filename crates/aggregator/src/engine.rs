use crate::error::VwapError;
use crate::types::{
    EngineState, InstrumentTotals, TradeEvent, VwapSnapshot, ZeroVolumePolicy, MAX_TRADE_MAGNITUDE,
    MAX_TRADE_SCALE,
};
use parking_lot::RwLock;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Window capacity used when the caller asks for a size of zero.
pub const DEFAULT_WINDOW_SIZE: usize = 200;

/// Largest window whose sums of in-range trades are guaranteed to stay exact:
/// `MAX_WINDOW_SIZE * MAX_TRADE_MAGNITUDE * 10^MAX_TRADE_SCALE` fits the
/// 96-bit mantissa of [`Decimal`].
pub const MAX_WINDOW_SIZE: usize = 50_000;

/// Fractional digits kept by every VWAP division.
pub const DIVISION_PRECISION: u32 = 16;

#[derive(Debug, Default)]
struct WindowState {
    window: VecDeque<TradeEvent>,
    totals: HashMap<String, InstrumentTotals>,
    vwap: HashMap<String, Decimal>,
}

impl WindowState {
    #[inline]
    fn totals_of(&self, instrument_id: &str) -> InstrumentTotals {
        self.totals.get(instrument_id).copied().unwrap_or_default()
    }

    /// Applies `event`, evicting the oldest trade when the window is full.
    ///
    /// All new totals are computed before any state changes, so an error
    /// leaves the window exactly as it was.
    fn apply(
        &mut self,
        event: TradeEvent,
        window_size: usize,
        policy: ZeroVolumePolicy,
    ) -> Result<Option<TradeEvent>, VwapError> {
        event.validate()?;

        let oldest = if self.window.len() >= window_size {
            self.window.front()
        } else {
            None
        };

        let drained = match oldest {
            Some(oldest) => Some(
                self.totals_of(&oldest.instrument_id)
                    .checked_subtract(oldest)
                    .ok_or_else(|| VwapError::overflow(&oldest.instrument_id))?,
            ),
            None => None,
        };

        // Presence in the VWAP map, not the totals, decides whether the
        // instrument accumulates or starts over.
        let (seen, base) = match (oldest, drained) {
            (Some(oldest), Some(drained)) if oldest.instrument_id == event.instrument_id => {
                let present = match vwap_of(&drained) {
                    Some(_) => true,
                    None => {
                        policy == ZeroVolumePolicy::Retain
                            && self.vwap.contains_key(&event.instrument_id)
                    }
                };
                (present, drained)
            }
            _ => (
                self.vwap.contains_key(&event.instrument_id),
                self.totals_of(&event.instrument_id),
            ),
        };
        let start = if seen { base } else { InstrumentTotals::default() };
        let accrued = start
            .checked_add(&event)
            .ok_or_else(|| VwapError::overflow(&event.instrument_id))?;

        let evicted = match drained {
            Some(drained) => self.window.pop_front().map(|oldest| {
                match vwap_of(&drained) {
                    Some(vwap) => {
                        self.vwap.insert(oldest.instrument_id.clone(), vwap);
                    }
                    None => {
                        if policy == ZeroVolumePolicy::Clear {
                            self.vwap.remove(&oldest.instrument_id);
                        }
                    }
                }
                self.totals.insert(oldest.instrument_id.clone(), drained);
                oldest
            }),
            None => None,
        };

        if let Some(vwap) = vwap_of(&accrued) {
            self.vwap.insert(event.instrument_id.clone(), vwap);
        }
        self.totals.insert(event.instrument_id.clone(), accrued);
        self.window.push_back(event);
        Ok(evicted)
    }
}

#[inline]
fn vwap_of(totals: &InstrumentTotals) -> Option<Decimal> {
    if totals.volume_sum.is_zero() {
        return None;
    }
    totals
        .weighted_sum
        .checked_div(totals.volume_sum)
        .map(|v| v.round_dp_with_strategy(DIVISION_PRECISION, RoundingStrategy::MidpointAwayFromZero))
}

/// Volume-weighted average price over a bounded, count-limited window of
/// trades.
///
/// The window capacity is shared by all instruments: a burst of trades on one
/// instrument evicts the oldest trades of any other instrument. Size the
/// window for the combined trade rate, not per instrument.
///
/// Every operation takes the internal lock for its whole duration, and reads
/// return owned copies, so no caller can observe a half-applied update.
#[derive(Debug)]
pub struct WindowedVwapEngine {
    window_size: usize,
    policy: ZeroVolumePolicy,
    state: RwLock<WindowState>,
}

impl WindowedVwapEngine {
    /// Builds an engine and replays `initial_events` through [`update`](Self::update).
    ///
    /// A `window_size` of zero selects [`DEFAULT_WINDOW_SIZE`].
    pub fn new(initial_events: Vec<TradeEvent>, window_size: usize) -> Result<Self, VwapError> {
        Self::with_policy(initial_events, window_size, ZeroVolumePolicy::default())
    }

    pub fn with_policy(
        initial_events: Vec<TradeEvent>,
        window_size: usize,
        policy: ZeroVolumePolicy,
    ) -> Result<Self, VwapError> {
        let window_size = if window_size == 0 {
            DEFAULT_WINDOW_SIZE
        } else {
            window_size
        };

        if window_size > MAX_WINDOW_SIZE {
            return Err(VwapError::WindowTooLarge {
                window_size,
                max: MAX_WINDOW_SIZE,
            });
        }

        if initial_events.len() > window_size {
            return Err(VwapError::Configuration {
                initial: initial_events.len(),
                window_size,
            });
        }

        let mut state = WindowState {
            window: VecDeque::with_capacity(window_size),
            ..WindowState::default()
        };
        for event in initial_events {
            state.apply(event, window_size, policy)?;
        }

        debug!(
            window_size,
            initial = state.window.len(),
            ?policy,
            max_scale = MAX_TRADE_SCALE,
            max_magnitude = %MAX_TRADE_MAGNITUDE,
            "windowed vwap engine created"
        );

        Ok(Self {
            window_size,
            policy,
            state: RwLock::new(state),
        })
    }

    /// Applies one trade: evicts the oldest event if the window is full, then
    /// accrues `event`. Returns the evicted event, if any.
    ///
    /// Fails only for trades outside the range [`TradeEvent::validate`]
    /// accepts; the engine is left unchanged in that case.
    #[inline]
    pub fn update(&self, event: TradeEvent) -> Result<Option<TradeEvent>, VwapError> {
        self.state.write().apply(event, self.window_size, self.policy)
    }

    /// Copy of the current VWAP per instrument.
    #[inline]
    pub fn snapshot(&self) -> VwapSnapshot {
        self.state
            .read()
            .vwap
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    #[inline]
    pub fn vwap(&self, instrument_id: &str) -> Option<Decimal> {
        self.state.read().vwap.get(instrument_id).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.state.read().window.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state.read().window.is_empty()
    }

    #[inline]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    #[inline]
    pub fn policy(&self) -> ZeroVolumePolicy {
        self.policy
    }

    /// Copy of the windowed events, oldest first.
    pub fn events(&self) -> Vec<TradeEvent> {
        self.state.read().window.iter().cloned().collect()
    }

    #[inline]
    pub fn totals(&self, instrument_id: &str) -> Option<InstrumentTotals> {
        self.state.read().totals.get(instrument_id).copied()
    }

    pub fn state(&self) -> EngineState {
        let state = self.state.read();
        EngineState {
            window_size: self.window_size,
            events: state.window.iter().cloned().collect(),
            totals: state
                .totals
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            vwap: state.vwap.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}
