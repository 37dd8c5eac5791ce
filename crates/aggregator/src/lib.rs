//! # Aggregator: windowed VWAP over a shared trade window
//!
//! - Count-bounded FIFO window shared by all instruments
//! - Per-instrument running totals kept exact with `rust_decimal`, inside a
//!   bounded trade range
//! - One lock around all state; every read returns a copy

pub mod engine;
pub mod error;
pub mod types;

pub use engine::{WindowedVwapEngine, DEFAULT_WINDOW_SIZE, DIVISION_PRECISION, MAX_WINDOW_SIZE};
pub use error::VwapError;
pub use types::*;
