//! Limit order book matching engine for a demo cryptocurrency exchange.
//!
//! Core features:
//! - Price-time priority matching (best price first, then FIFO)
//! - Market, limit, IOC, FOK and stop-loss order types
//! - Exact decimal prices, quantities and maker/taker fees
//! - Per-symbol books behind their own locks, independent across symbols
//! - Stop orders triggered by trades and resubmitted as market orders
//!
//! [`OrderBook`] is a single symbol's book and matcher; [`Engine`] is the
//! process-wide registry that owns the books, serializes submits per book
//! and drives the stop pipeline. Market data leaves through the
//! [`Broadcaster`] trait.

pub mod book;
pub mod decimal;
pub mod engine;
pub mod price_level;
pub mod types;

pub use book::{Bbo, BookSnapshot, DepthSnapshot, OrderBook, StopOrderInfo};
pub use engine::{Broadcaster, Engine, StopPlaced};
pub use price_level::PriceLevel;
pub use types::{
    now_iso, EngineError, Order, OrderStatus, OrderType, Side, SubmitResult, Trade,
};
