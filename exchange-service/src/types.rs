//! API types for the REST and WebSocket interfaces.

use matchbook::decimal::parse_decimal;
use matchbook::{DepthSnapshot, Order, OrderType, Side, Trade};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Request body for `POST /orders`. Quantity and price arrive as decimal
/// strings and are parsed exactly; floats are rejected by construction.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderSubmission {
    pub symbol: String,
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
}

impl OrderSubmission {
    /// Validates the payload and builds the engine order.
    ///
    /// Rules: quantity parses and is positive; price, when present, parses
    /// and is positive; every type except market requires a price.
    pub fn into_order(self) -> Result<Order, String> {
        let quantity = parse_decimal(&self.quantity)
            .map_err(|e| format!("Invalid quantity: {e}"))?;
        if quantity <= Decimal::ZERO {
            return Err("Invalid quantity: quantity must be positive".into());
        }

        let price = match &self.price {
            Some(raw) => {
                let price = parse_decimal(raw).map_err(|e| format!("Invalid price: {e}"))?;
                if price <= Decimal::ZERO {
                    return Err("Invalid price: price must be positive".into());
                }
                Some(price)
            }
            None => None,
        };

        if price.is_none() {
            match self.order_type {
                OrderType::StopLoss => {
                    return Err("Stop-loss orders require a trigger price".into())
                }
                OrderType::Limit => return Err("Limit orders require a price".into()),
                OrderType::Ioc => return Err("ioc orders require a price".into()),
                OrderType::Fok => return Err("fok orders require a price".into()),
                OrderType::Market => {}
            }
        }

        Ok(Order::new(
            self.symbol,
            self.side,
            self.order_type,
            quantity,
            price,
        ))
    }
}

/// Request body for `PUT /orders/{id}` and `PUT /stoporder/{id}`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ModifyRequest {
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
}

impl ModifyRequest {
    pub fn parsed(&self) -> Result<(Option<Decimal>, Option<Decimal>), String> {
        let price = match &self.price {
            Some(raw) => {
                Some(parse_decimal(raw).map_err(|e| format!("Invalid price: {e}"))?)
            }
            None => None,
        };
        let quantity = match &self.quantity {
            Some(raw) => {
                Some(parse_decimal(raw).map_err(|e| format!("Invalid quantity: {e}"))?)
            }
            None => None,
        };
        Ok((price, quantity))
    }
}

/// Response for `DELETE /order/{id}` and `DELETE /stoporder/{id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub order_id: String,
    pub status: String,
}

/// Response for `PUT /stoporder/{id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StopModifiedResponse {
    pub order_id: String,
    pub status: String,
    pub new_trigger_price: String,
    pub new_quantity: String,
}

/// Query parameters for `GET /book/{symbol}`.
#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    pub depth: Option<usize>,
}

/// Query parameters for `POST /demo/fill`.
#[derive(Debug, Deserialize)]
pub struct DemoFillQuery {
    pub symbol: String,
    pub bids: Option<usize>,
    pub asks: Option<usize>,
}

/// List of symbols with at least one book.
#[derive(Debug, Serialize, Deserialize)]
pub struct SymbolsResponse {
    pub symbols: Vec<String>,
}

/// Frames pushed on the streaming channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamFrame {
    #[serde(rename = "trade")]
    Trade(Trade),
    #[serde(rename = "l2_update")]
    L2Update(DepthSnapshot),
    #[serde(rename = "ping")]
    Ping { timestamp: String },
    #[serde(rename = "pong")]
    Pong { timestamp: String },
}
