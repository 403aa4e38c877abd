//! Core order and trade types.

use chrono::{SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Side of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side an incoming order matches against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Supported order types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    Ioc,
    Fok,
    #[serde(rename = "stoploss")]
    StopLoss,
}

/// Terminal disposition of a submitted order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Fully executed.
    Filled,
    /// Some quantity executed, the rest canceled or resting.
    Partial,
    /// No execution, resting on the book.
    Resting,
    /// No execution and nothing resting.
    Canceled,
}

/// A single order.
///
/// `remaining` starts equal to `quantity` and only decreases while matching;
/// zero means fully filled. For stop orders `price` is the trigger price,
/// for limit-style orders it is the limit price, and market orders carry
/// none.
#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub remaining: Decimal,
    /// Creation instant in nanoseconds since the epoch, diagnostics only.
    /// Queue position, not this value, decides time priority.
    pub timestamp: u128,
    pub created_at: String,
}

impl Order {
    /// Creates a fresh order with a new UUID and `remaining == quantity`.
    pub fn new(
        symbol: impl Into<String>,
        side: Side,
        order_type: OrderType,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            order_type,
            quantity,
            price,
            remaining: quantity,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            created_at: now_iso(),
        }
    }
}

/// An executed trade. Decimal fields serialize as strings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: String,
    pub symbol: String,
    /// `<symbol>-<seq>-<uuid>`, unique per book and globally.
    pub trade_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub trade_value: Decimal,
    /// The taker's side.
    pub aggressor_side: Side,
    pub maker_order_id: String,
    pub taker_order_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub maker_fee: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub taker_fee: Decimal,
}

/// Outcome of a submit, also the HTTP response envelope for live orders.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitResult {
    pub order_id: String,
    pub status: OrderStatus,
    pub trades: Vec<Trade>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Engine-level failures. Matching outcomes (partial fills, FOK rejection)
/// are not errors; they are reported inside [`SubmitResult`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error("order {0} not found")]
    OrderNotFound(String),
    #[error("stop order {0} not found")]
    StopOrderNotFound(String),
}

/// Current UTC instant as an ISO-8601 string.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
