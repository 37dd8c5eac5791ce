use aggregator::VwapError;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("websocket error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("malformed feed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("timed out connecting to {url} after {timeout_ms}ms")]
    ConnectTimeout { url: String, timeout_ms: u64 },
    #[error("no subscription acknowledgement within {timeout_ms}ms")]
    SubscribeTimeout { timeout_ms: u64 },
    #[error("connection closed before subscription was acknowledged")]
    ConnectionClosed,
    #[error("no product ids configured")]
    NoProducts,
    #[error("subscription rejected: {message} ({reason})")]
    SubscriptionRejected { message: String, reason: String },
    #[error("exchange error: {message} ({reason})")]
    Exchange { message: String, reason: String },
    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("negative {field}: {value}")]
    NegativeValue { field: &'static str, value: Decimal },
    #[error("trade outside the exact range: {0}")]
    OutOfRange(#[from] VwapError),
    #[error("invalid feed configuration: {0}")]
    InvalidConfig(String),
    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl FeedError {
    /// Errors that reconnecting cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FeedError::NoProducts
                | FeedError::SubscriptionRejected { .. }
                | FeedError::InvalidConfig(_)
                | FeedError::ReconnectExhausted { .. }
        )
    }
}
