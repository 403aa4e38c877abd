//! Multi-symbol engine: the registry of order books and the stop pipeline.
//!
//! Books live in a `DashMap` keyed by symbol, each behind its own async
//! `RwLock`, so symbols progress independently while a single book only ever
//! sees one writer. Market-data fan-out goes through the [`Broadcaster`]
//! seam, which is invoked from inside the book lock and must never call back
//! into the engine.

use crate::book::{Bbo, BookSnapshot, DepthSnapshot, OrderBook, StopOrderInfo};
use crate::types::{EngineError, Order, OrderType, SubmitResult, Trade};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Outbound market-data hook. Implementations must be cheap and
/// non-blocking: `on_trade` runs while the book lock is held.
pub trait Broadcaster: Send + Sync {
    /// One executed trade, delivered in execution order.
    fn on_trade(&self, trade: &Trade);
    /// Book depth after a submit, cancel or modify.
    fn on_depth(&self, symbol: &str, depth: &DepthSnapshot);
}

/// Depth levels included in pushed snapshots.
const BROADCAST_DEPTH: usize = 10;

/// Cheap-to-clone handle owning every book and the stop registries.
#[derive(Clone, Default)]
pub struct Engine {
    books: Arc<DashMap<String, Arc<RwLock<OrderBook>>>>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broadcaster(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            books: Arc::new(DashMap::new()),
            broadcaster: Some(broadcaster),
        }
    }

    /// The book for `symbol`, created empty on first use.
    fn book(&self, symbol: &str) -> Arc<RwLock<OrderBook>> {
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(OrderBook::new(symbol))))
            .clone()
    }

    fn all_books(&self) -> Vec<Arc<RwLock<OrderBook>>> {
        self.books.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.books.iter().map(|e| e.key().clone()).collect()
    }

    /// Submits a live (non-stop) order to its symbol's book.
    ///
    /// Matching, trade fan-out and stop-trigger collection all happen under
    /// one write-lock acquisition; the depth frame is published and any
    /// triggered stops are resubmitted on fresh tasks after the lock is
    /// released, so a cascade re-acquires the lock per hop.
    pub async fn submit(&self, order: Order) -> Result<SubmitResult, EngineError> {
        validate_live(&order)?;
        let symbol = order.symbol.clone();
        let book = self.book(&symbol);

        let (result, triggered, depth) = {
            let mut book = book.write().await;
            let (result, triggered) = book.submit(order, self.broadcaster.as_deref());
            let depth = book.depth(BROADCAST_DEPTH);
            (result, triggered, depth)
        };

        self.publish_depth(&symbol, &depth);
        for stop in triggered {
            self.schedule_resubmit(stop);
        }
        Ok(result)
    }

    /// Queues a stop order for its symbol.
    pub async fn place_stop(&self, order: Order) -> Result<StopPlaced, EngineError> {
        if order.order_type != OrderType::StopLoss {
            return Err(EngineError::InvalidOrder(
                "only stoploss orders can be placed as stops".into(),
            ));
        }
        if order.quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder("quantity must be positive".into()));
        }
        let Some(trigger) = order.price else {
            return Err(EngineError::InvalidOrder(
                "stop orders require a trigger price".into(),
            ));
        };

        let book = self.book(&order.symbol);
        let order_id = order.id.clone();
        book.write().await.place_stop(order);
        Ok(StopPlaced {
            order_id,
            status: "stop_placed".into(),
            trigger_price: trigger,
        })
    }

    /// Cancels a resting order, wherever it rests.
    pub async fn cancel_order(&self, order_id: &str) -> Result<Order, EngineError> {
        for book in self.all_books() {
            let mut guard = book.write().await;
            if !guard.contains_order(order_id) {
                continue;
            }
            let Some(order) = guard.cancel(order_id) else {
                // index hit but queue miss; the book already logged it
                break;
            };
            let symbol = guard.symbol().to_string();
            let depth = guard.depth(BROADCAST_DEPTH);
            drop(guard);
            self.publish_depth(&symbol, &depth);
            return Ok(order);
        }
        Err(EngineError::OrderNotFound(order_id.to_string()))
    }

    /// Cancels a pending stop order.
    pub async fn cancel_stop(&self, order_id: &str) -> Result<Order, EngineError> {
        for book in self.all_books() {
            let mut guard = book.write().await;
            if let Some(order) = guard.cancel_stop(order_id) {
                info!(id = order_id, symbol = guard.symbol(), "stop order canceled");
                return Ok(order);
            }
        }
        Err(EngineError::StopOrderNotFound(order_id.to_string()))
    }

    /// Replaces a resting order's price and/or quantity.
    ///
    /// The order is taken off its level and routed through the matcher
    /// again under the same lock acquisition, keeping its id. A new price
    /// that crosses the book therefore trades instead of resting crossed,
    /// and the order always loses time priority at its level.
    pub async fn modify_order(
        &self,
        order_id: &str,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    ) -> Result<SubmitResult, EngineError> {
        validate_updates(price, quantity)?;
        for book in self.all_books() {
            let mut guard = book.write().await;
            if !guard.contains_order(order_id) {
                continue;
            }
            let Some(mut order) = guard.cancel(order_id) else {
                break;
            };
            if let Some(quantity) = quantity {
                order.quantity = quantity;
                order.remaining = quantity;
            }
            if let Some(price) = price {
                order.price = Some(price);
            }
            info!(
                id = order_id,
                price = ?order.price,
                quantity = %order.quantity,
                "modifying resting order"
            );
            let symbol = guard.symbol().to_string();
            let (result, triggered) = guard.submit(order, self.broadcaster.as_deref());
            let depth = guard.depth(BROADCAST_DEPTH);
            drop(guard);
            self.publish_depth(&symbol, &depth);
            for stop in triggered {
                self.schedule_resubmit(stop);
            }
            return Ok(result);
        }
        Err(EngineError::OrderNotFound(order_id.to_string()))
    }

    /// Updates a pending stop's trigger price and/or quantity in place.
    /// No reordering and no re-evaluation until the next trade.
    pub async fn modify_stop(
        &self,
        order_id: &str,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    ) -> Result<Order, EngineError> {
        validate_updates(price, quantity)?;
        for book in self.all_books() {
            let mut guard = book.write().await;
            if let Some(stop) = guard.stop_mut(order_id) {
                if let Some(quantity) = quantity {
                    stop.quantity = quantity;
                    stop.remaining = quantity;
                }
                if let Some(price) = price {
                    stop.price = Some(price);
                }
                info!(id = order_id, trigger = ?stop.price, "stop order modified");
                return Ok(stop.clone());
            }
        }
        Err(EngineError::StopOrderNotFound(order_id.to_string()))
    }

    pub async fn bbo(&self, symbol: &str) -> Bbo {
        self.book(symbol).read().await.bbo()
    }

    pub async fn depth(&self, symbol: &str, levels: usize) -> DepthSnapshot {
        self.book(symbol).read().await.depth(levels)
    }

    /// Depth plus the symbol's pending stop orders, one consistent read.
    pub async fn book_snapshot(&self, symbol: &str, levels: usize) -> BookSnapshot {
        let book = self.book(symbol);
        let guard = book.read().await;
        BookSnapshot {
            symbol: guard.symbol().to_string(),
            order_book: guard.depth(levels),
            stop_orders: guard.stops().iter().map(StopOrderInfo::from).collect(),
        }
    }

    fn publish_depth(&self, symbol: &str, depth: &DepthSnapshot) {
        if let Some(b) = &self.broadcaster {
            b.on_depth(symbol, depth);
        }
    }

    /// Resubmits a triggered stop as a market order on a fresh task, so the
    /// submission acquires the book lock on its own.
    fn schedule_resubmit(&self, stop: Order) {
        let engine = self.clone();
        tokio::spawn(async move {
            let id = stop.id.clone();
            match engine.submit(stop).await {
                Ok(result) => {
                    info!(id = %id, status = ?result.status, "triggered stop resubmitted")
                }
                Err(err) => error!(id = %id, %err, "triggered stop resubmission failed"),
            }
        });
    }
}

/// A placed stop, the response envelope for stop submissions.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct StopPlaced {
    pub order_id: String,
    pub status: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub trigger_price: Decimal,
}

fn validate_live(order: &Order) -> Result<(), EngineError> {
    if order.order_type == OrderType::StopLoss {
        return Err(EngineError::InvalidOrder(
            "stop orders are placed against the stop registry, not submitted".into(),
        ));
    }
    if order.quantity <= Decimal::ZERO {
        return Err(EngineError::InvalidOrder("quantity must be positive".into()));
    }
    Ok(())
}

fn validate_updates(
    price: Option<Decimal>,
    quantity: Option<Decimal>,
) -> Result<(), EngineError> {
    if let Some(price) = price {
        if price <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder("price must be positive".into()));
        }
    }
    if let Some(quantity) = quantity {
        if quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder("quantity must be positive".into()));
        }
    }
    Ok(())
}
