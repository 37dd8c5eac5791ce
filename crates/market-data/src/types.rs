use crate::error::FeedError;
use aggregator::TradeEvent;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const MATCHES_CHANNEL: &str = "matches";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    #[serde(default)]
    pub product_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub product_ids: Vec<String>,
    pub channels: Vec<Channel>,
}

impl SubscribeRequest {
    #[inline]
    pub fn matches(product_ids: &[String]) -> Self {
        Self {
            kind: "subscribe",
            product_ids: product_ids.to_vec(),
            channels: vec![Channel {
                name: MATCHES_CHANNEL.to_string(),
                product_ids: product_ids.to_vec(),
            }],
        }
    }
}

/// An executed trade on the `matches` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchMessage {
    pub time: DateTime<Utc>,
    pub product_id: String,
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub trade_id: u64,
    #[serde(default)]
    pub maker_order_id: String,
    #[serde(default)]
    pub taker_order_id: String,
    #[serde(default)]
    pub side: String,
    pub size: String,
    pub price: String,
}

/// Messages received from the feed, keyed by their `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    Subscriptions {
        #[serde(default)]
        channels: Vec<Channel>,
    },
    Match(MatchMessage),
    LastMatch(MatchMessage),
    Error {
        #[serde(default)]
        message: String,
        #[serde(default)]
        reason: String,
    },
    #[serde(other)]
    Other,
}

/// Decodes one text frame. Returns `Ok(None)` for message types that carry
/// no trade.
pub fn parse_payload(text: &str) -> Result<Option<MatchMessage>, FeedError> {
    match serde_json::from_str::<FeedMessage>(text)? {
        FeedMessage::Match(m) | FeedMessage::LastMatch(m) => Ok(Some(m)),
        FeedMessage::Error { message, reason } => Err(FeedError::Exchange { message, reason }),
        FeedMessage::Subscriptions { .. } | FeedMessage::Other => Ok(None),
    }
}

fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, FeedError> {
    let parsed = Decimal::from_str(value.trim()).map_err(|_| FeedError::InvalidNumber {
        field,
        value: value.to_string(),
    })?;
    if parsed.is_sign_negative() && !parsed.is_zero() {
        return Err(FeedError::NegativeValue {
            field,
            value: parsed,
        });
    }
    Ok(parsed)
}

impl TryFrom<&MatchMessage> for TradeEvent {
    type Error = FeedError;

    fn try_from(m: &MatchMessage) -> Result<Self, Self::Error> {
        let price = parse_decimal("price", &m.price)?;
        let volume = parse_decimal("size", &m.size)?;
        let trade = TradeEvent::new(price, volume, m.product_id.clone());
        trade.validate()?;
        Ok(trade)
    }
}
