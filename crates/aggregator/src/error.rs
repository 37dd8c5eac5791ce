use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VwapError {
    #[error("initial events ({initial}) exceed window size {window_size}")]
    Configuration { initial: usize, window_size: usize },

    #[error("window size {window_size} exceeds the exact-arithmetic limit of {max}")]
    WindowTooLarge { window_size: usize, max: usize },

    #[error("{field} of {instrument_id} must not be negative, got {value}")]
    Negative {
        instrument_id: String,
        field: &'static str,
        value: Decimal,
    },

    #[error("price and volume of {instrument_id} carry {scale} fractional digits, limit is {max}")]
    Precision {
        instrument_id: String,
        scale: u32,
        max: u32,
    },

    #[error("{field} {value} of {instrument_id} is not below {max}")]
    Magnitude {
        instrument_id: String,
        field: &'static str,
        value: Decimal,
        max: Decimal,
    },

    #[error("running totals for {instrument_id} cannot be represented exactly")]
    Overflow { instrument_id: String },
}

impl VwapError {
    #[inline]
    pub(crate) fn overflow(instrument_id: &str) -> Self {
        Self::Overflow {
            instrument_id: instrument_id.to_string(),
        }
    }
}
