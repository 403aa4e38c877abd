//! Per-symbol order book with price-time priority matching.
//!
//! Both sides are ascending `BTreeMap`s keyed by price; the best ask is the
//! first key, the best bid the last. Each map value is a [`PriceLevel`] FIFO
//! queue, which is the single owner of its resting orders. The id index maps
//! an order id to the side and price of the level that owns it.
//!
//! The book itself is not synchronized. The [`Engine`](crate::engine::Engine)
//! wraps each book in a `RwLock` and calls [`OrderBook::submit`] under the
//! write half, so one submit never interleaves with another on the same book.

use crate::decimal::{mul_truncated, MAKER_FEE_RATE, TAKER_FEE_RATE};
use crate::engine::Broadcaster;
use crate::price_level::PriceLevel;
use crate::types::{now_iso, Order, OrderStatus, OrderType, Side, SubmitResult, Trade};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Best bid and offer, each as `(price, level total)` decimal strings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bbo {
    pub symbol: String,
    pub best_bid: Option<(String, String)>,
    pub best_ask: Option<(String, String)>,
    pub timestamp: String,
}

/// Aggregated book depth. Asks ascend, bids descend, entries are
/// `[price, total]` decimal strings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub symbol: String,
    pub asks: Vec<(String, String)>,
    pub bids: Vec<(String, String)>,
    pub timestamp: String,
}

/// A pending stop order as reported in book snapshots.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StopOrderInfo {
    pub order_id: String,
    pub side: Side,
    pub quantity: String,
    pub trigger_price: String,
    pub order_type: OrderType,
}

impl From<&Order> for StopOrderInfo {
    fn from(o: &Order) -> Self {
        Self {
            order_id: o.id.clone(),
            side: o.side,
            quantity: o.remaining.to_string(),
            trigger_price: o.price.map(|p| p.to_string()).unwrap_or_default(),
            order_type: o.order_type,
        }
    }
}

/// Depth plus pending stops, the `GET /book/{symbol}` response shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: String,
    pub order_book: DepthSnapshot,
    pub stop_orders: Vec<StopOrderInfo>,
}

/// Side and price of the level that owns a resting order.
#[derive(Clone, Copy, Debug)]
struct Locator {
    side: Side,
    price: Decimal,
}

pub struct OrderBook {
    symbol: String,
    bids: BTreeMap<Decimal, PriceLevel>,
    asks: BTreeMap<Decimal, PriceLevel>,
    orders: HashMap<String, Locator>,
    /// Pending stop orders for this symbol. Never reachable from the sides
    /// or the id index; guarded by the same lock as the rest of the book.
    stops: Vec<Order>,
    trade_seq: u64,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
            stops: Vec::new(),
            trade_seq: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Submits an order against this book.
    ///
    /// Returns the result envelope plus every pending stop triggered by this
    /// submit's trades. Triggered stops are already removed from the pending
    /// list and rewritten to market orders; the caller resubmits them after
    /// releasing the book lock.
    pub fn submit(
        &mut self,
        mut order: Order,
        broadcaster: Option<&dyn Broadcaster>,
    ) -> (SubmitResult, Vec<Order>) {
        let order_id = order.id.clone();
        info!(
            symbol = %self.symbol,
            id = %order_id,
            side = ?order.side,
            order_type = ?order.order_type,
            quantity = %order.quantity,
            price = ?order.price,
            "submitting order"
        );

        let mut trades: Vec<Trade> = Vec::new();
        let mut triggered: Vec<Order> = Vec::new();

        if order.order_type == OrderType::StopLoss {
            error!(id = %order_id, "stop orders are queued for triggering, not matched directly");
            return (
                SubmitResult {
                    order_id,
                    status: OrderStatus::Canceled,
                    trades,
                    reason: Some("stop_not_matchable".into()),
                },
                triggered,
            );
        }

        let is_market = order.order_type == OrderType::Market;

        if order.order_type == OrderType::Fok && self.fok_available(&order) < order.quantity {
            info!(id = %order_id, "fok order not fully fillable, canceled");
            return (
                SubmitResult {
                    order_id,
                    status: OrderStatus::Canceled,
                    trades,
                    reason: Some("fok_not_fillable".into()),
                },
                triggered,
            );
        }

        while order.remaining > Decimal::ZERO {
            let best_price = match order.side {
                Side::Buy => self.asks.keys().next().copied(),
                Side::Sell => self.bids.keys().next_back().copied(),
            };
            let Some(best_price) = best_price else { break };

            let acceptable = is_market
                || match (order.side, order.price) {
                    (Side::Buy, Some(limit)) => best_price <= limit,
                    (Side::Sell, Some(limit)) => best_price >= limit,
                    (_, None) => false,
                };
            if !acceptable {
                break;
            }

            let level_cleared = {
                let level = match order.side {
                    Side::Buy => self.asks.get_mut(&best_price),
                    Side::Sell => self.bids.get_mut(&best_price),
                };
                let Some(level) = level else { break };

                // FIFO within the level: always trade against the head.
                while order.remaining > Decimal::ZERO {
                    let Some(resting) = level.peek_oldest() else { break };
                    let trade_qty = order.remaining.min(resting.remaining);
                    // The maker sets the price. The level key is a fallback
                    // for a resting order that somehow lost its price.
                    let exec_price = resting.price.unwrap_or(best_price);
                    let maker_id = resting.id.clone();

                    if let Some(filled) = level.decrease_oldest(trade_qty) {
                        self.orders.remove(&filled.id);
                    }
                    order.remaining -= trade_qty;

                    self.trade_seq += 1;
                    let trade = build_trade(
                        &self.symbol,
                        self.trade_seq,
                        exec_price,
                        trade_qty,
                        &maker_id,
                        &order_id,
                        order.side,
                    );
                    debug!(
                        trade_id = %trade.trade_id,
                        price = %trade.price,
                        quantity = %trade.quantity,
                        "trade executed"
                    );
                    if let Some(b) = broadcaster {
                        b.on_trade(&trade);
                    }
                    drain_triggered(&mut self.stops, trade.price, &mut triggered);
                    trades.push(trade);
                }
                level.is_empty()
            };

            if level_cleared {
                match order.side {
                    Side::Buy => {
                        self.asks.remove(&best_price);
                    }
                    Side::Sell => {
                        self.bids.remove(&best_price);
                    }
                }
            }
        }

        let status = if order.remaining.is_zero() {
            info!(id = %order_id, "order fully filled");
            OrderStatus::Filled
        } else {
            match order.order_type {
                OrderType::Ioc | OrderType::Market => {
                    // Neither type ever rests; the remainder is dropped.
                    if trades.is_empty() {
                        OrderStatus::Canceled
                    } else {
                        OrderStatus::Partial
                    }
                }
                OrderType::Fok => {
                    // The pre-check and the loop ran under one lock, so a
                    // remainder here means the book state is inconsistent.
                    error!(
                        id = %order_id,
                        remaining = %order.remaining,
                        "fok order passed pre-check but did not fill, canceling"
                    );
                    return (
                        SubmitResult {
                            order_id,
                            status: OrderStatus::Canceled,
                            trades: Vec::new(),
                            reason: None,
                        },
                        triggered,
                    );
                }
                OrderType::Limit => match order.price {
                    Some(price) => {
                        let status = if trades.is_empty() {
                            OrderStatus::Resting
                        } else {
                            OrderStatus::Partial
                        };
                        info!(
                            id = %order_id,
                            side = ?order.side,
                            remaining = %order.remaining,
                            %price,
                            "limit order resting on book"
                        );
                        self.orders
                            .insert(order_id.clone(), Locator { side: order.side, price });
                        let book_side = match order.side {
                            Side::Buy => &mut self.bids,
                            Side::Sell => &mut self.asks,
                        };
                        book_side.entry(price).or_default().add(order);
                        status
                    }
                    None => {
                        error!(id = %order_id, "limit order without a price cannot rest");
                        if trades.is_empty() {
                            OrderStatus::Canceled
                        } else {
                            OrderStatus::Partial
                        }
                    }
                },
                OrderType::StopLoss => unreachable!("rejected before matching"),
            }
        };

        (
            SubmitResult {
                order_id,
                status,
                trades,
                reason: None,
            },
            triggered,
        )
    }

    /// Liquidity on the opposite side at prices the order would accept.
    fn fok_available(&self, order: &Order) -> Decimal {
        match order.price {
            // No limit price: the whole opposite book is acceptable.
            None => match order.side {
                Side::Buy => self.asks.values().map(PriceLevel::total).sum(),
                Side::Sell => self.bids.values().map(PriceLevel::total).sum(),
            },
            Some(limit) => match order.side {
                Side::Buy => self
                    .asks
                    .range(..=limit)
                    .map(|(_, level)| level.total())
                    .sum(),
                Side::Sell => self
                    .bids
                    .range(limit..)
                    .map(|(_, level)| level.total())
                    .sum(),
            },
        }
    }

    /// Removes a resting order by id, deleting its level if emptied.
    pub fn cancel(&mut self, order_id: &str) -> Option<Order> {
        let loc = self.orders.remove(order_id)?;
        let book_side = match loc.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let Some(level) = book_side.get_mut(&loc.price) else {
            error!(id = order_id, "order index points at a missing price level");
            return None;
        };
        let order = level.remove(order_id);
        if order.is_none() {
            error!(id = order_id, "order index points at a level that does not hold it");
        }
        if level.is_empty() {
            book_side.remove(&loc.price);
        }
        if let Some(o) = &order {
            info!(id = %o.id, symbol = %self.symbol, "order canceled");
        }
        order
    }

    pub fn contains_order(&self, order_id: &str) -> bool {
        self.orders.contains_key(order_id)
    }

    /// Queues a stop order for triggering. It never touches the sides.
    pub fn place_stop(&mut self, order: Order) {
        info!(
            id = %order.id,
            symbol = %self.symbol,
            side = ?order.side,
            trigger = ?order.price,
            "stop order placed"
        );
        self.stops.push(order);
    }

    pub fn stops(&self) -> &[Order] {
        &self.stops
    }

    /// Removes a pending stop by id.
    pub fn cancel_stop(&mut self, order_id: &str) -> Option<Order> {
        let idx = self.stops.iter().position(|o| o.id == order_id)?;
        Some(self.stops.remove(idx))
    }

    /// Mutable access to a pending stop, for in-place trigger updates.
    pub fn stop_mut(&mut self, order_id: &str) -> Option<&mut Order> {
        self.stops.iter_mut().find(|o| o.id == order_id)
    }

    pub fn bbo(&self) -> Bbo {
        Bbo {
            symbol: self.symbol.clone(),
            best_bid: self
                .bids
                .iter()
                .next_back()
                .map(|(p, l)| (p.to_string(), l.total().to_string())),
            best_ask: self
                .asks
                .iter()
                .next()
                .map(|(p, l)| (p.to_string(), l.total().to_string())),
            timestamp: now_iso(),
        }
    }

    pub fn depth(&self, levels: usize) -> DepthSnapshot {
        DepthSnapshot {
            symbol: self.symbol.clone(),
            asks: self
                .asks
                .iter()
                .take(levels)
                .map(|(p, l)| (p.to_string(), l.total().to_string()))
                .collect(),
            bids: self
                .bids
                .iter()
                .rev()
                .take(levels)
                .map(|(p, l)| (p.to_string(), l.total().to_string()))
                .collect(),
            timestamp: now_iso(),
        }
    }

    pub fn trade_seq(&self) -> u64 {
        self.trade_seq
    }
}

fn build_trade(
    symbol: &str,
    seq: u64,
    price: Decimal,
    quantity: Decimal,
    maker_id: &str,
    taker_id: &str,
    aggressor: Side,
) -> Trade {
    let trade_value = mul_truncated(price, quantity);
    Trade {
        timestamp: now_iso(),
        symbol: symbol.to_string(),
        trade_id: format!("{symbol}-{seq}-{}", Uuid::new_v4()),
        price,
        quantity,
        trade_value,
        aggressor_side: aggressor,
        maker_order_id: maker_id.to_string(),
        taker_order_id: taker_id.to_string(),
        maker_fee: mul_truncated(trade_value, MAKER_FEE_RATE),
        taker_fee: mul_truncated(trade_value, TAKER_FEE_RATE),
    }
}

/// Moves every pending stop whose trigger is met by a trade at `price` into
/// `out`, rewritten as a market order. Buy stops fire at or above the
/// trigger, sell stops at or below. Insertion order is preserved, and a
/// removed stop cannot fire again for a later trade of the same submit.
fn drain_triggered(stops: &mut Vec<Order>, price: Decimal, out: &mut Vec<Order>) {
    let mut i = 0;
    while i < stops.len() {
        let fires = match (stops[i].side, stops[i].price) {
            (Side::Buy, Some(trigger)) => price >= trigger,
            (Side::Sell, Some(trigger)) => price <= trigger,
            (_, None) => false,
        };
        if fires {
            let mut stop = stops.remove(i);
            info!(
                id = %stop.id,
                trigger = ?stop.price,
                trade_price = %price,
                "stop order triggered"
            );
            stop.order_type = OrderType::Market;
            stop.price = None;
            out.push(stop);
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::parse_decimal;
    use std::sync::Mutex;

    fn d(s: &str) -> Decimal {
        parse_decimal(s).unwrap()
    }

    fn order(side: Side, order_type: OrderType, qty: &str, price: Option<&str>) -> Order {
        Order::new("TST-USD", side, order_type, d(qty), price.map(d))
    }

    fn sell_limit(qty: &str, price: &str) -> Order {
        order(Side::Sell, OrderType::Limit, qty, Some(price))
    }

    fn buy_limit(qty: &str, price: &str) -> Order {
        order(Side::Buy, OrderType::Limit, qty, Some(price))
    }

    fn submit(book: &mut OrderBook, order: Order) -> SubmitResult {
        book.submit(order, None).0
    }

    fn filled_qty(result: &SubmitResult) -> Decimal {
        result.trades.iter().map(|t| t.quantity).sum()
    }

    fn depth_pairs(entries: &[(String, String)]) -> Vec<(Decimal, Decimal)> {
        entries
            .iter()
            .map(|(p, q)| (d(p), d(q)))
            .collect()
    }

    #[test]
    fn limit_cross_fills_at_resting_price() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "101"));
        submit(&mut book, sell_limit("1", "102"));

        let res = submit(&mut book, buy_limit("1", "101"));
        assert_eq!(res.status, OrderStatus::Filled);
        assert_eq!(res.trades.len(), 1);
        assert_eq!(res.trades[0].price, d("101"));
        assert_eq!(res.trades[0].quantity, d("1"));

        let depth = book.depth(10);
        assert_eq!(depth_pairs(&depth.asks), vec![(d("102"), d("1"))]);
        assert!(depth.bids.is_empty());
    }

    #[test]
    fn market_sweep_walks_levels_best_first() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "100"));
        submit(&mut book, sell_limit("1", "101"));

        let res = submit(&mut book, order(Side::Buy, OrderType::Market, "1.5", None));
        assert_eq!(res.status, OrderStatus::Filled);
        assert_eq!(res.trades.len(), 2);
        assert_eq!(res.trades[0].price, d("100"));
        assert_eq!(res.trades[0].quantity, d("1"));
        assert_eq!(res.trades[1].price, d("101"));
        assert_eq!(res.trades[1].quantity, d("0.5"));

        let depth = book.depth(10);
        assert_eq!(depth_pairs(&depth.asks), vec![(d("101"), d("0.5"))]);
    }

    #[test]
    fn market_on_empty_book_cancels() {
        let mut book = OrderBook::new("TST-USD");
        let res = submit(&mut book, order(Side::Buy, OrderType::Market, "1", None));
        assert_eq!(res.status, OrderStatus::Canceled);
        assert!(res.trades.is_empty());
    }

    #[test]
    fn market_remainder_is_partial_and_never_rests() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "100"));

        let res = submit(&mut book, order(Side::Buy, OrderType::Market, "3", None));
        assert_eq!(res.status, OrderStatus::Partial);
        assert_eq!(filled_qty(&res), d("1"));

        let depth = book.depth(10);
        assert!(depth.asks.is_empty());
        assert!(depth.bids.is_empty());
    }

    #[test]
    fn non_crossing_limit_rests() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "105"));

        let res = submit(&mut book, buy_limit("1", "104"));
        assert_eq!(res.status, OrderStatus::Resting);
        assert!(res.trades.is_empty());

        let depth = book.depth(10);
        assert_eq!(depth_pairs(&depth.bids), vec![(d("104"), d("1"))]);
        assert_eq!(depth_pairs(&depth.asks), vec![(d("105"), d("1"))]);
    }

    #[test]
    fn book_is_uncrossed_after_any_submit() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("2", "100"));
        submit(&mut book, buy_limit("1", "103"));

        let bbo = book.bbo();
        // the crossing buy traded instead of resting above the ask
        assert!(bbo.best_bid.is_none());
        assert_eq!(bbo.best_ask.unwrap().0, "100");
    }

    #[test]
    fn ioc_partial_drops_remainder() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "200"));

        let res = submit(&mut book, order(Side::Buy, OrderType::Ioc, "2", Some("200")));
        assert_eq!(res.status, OrderStatus::Partial);
        assert_eq!(filled_qty(&res), d("1"));

        // nothing rested on either side
        let depth = book.depth(10);
        assert!(depth.asks.is_empty());
        assert!(depth.bids.is_empty());
    }

    #[test]
    fn ioc_with_no_liquidity_cancels() {
        let mut book = OrderBook::new("TST-USD");
        let res = submit(&mut book, order(Side::Buy, OrderType::Ioc, "2", Some("200")));
        assert_eq!(res.status, OrderStatus::Canceled);
        assert!(res.trades.is_empty());
    }

    #[test]
    fn ioc_respects_limit_price() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "200"));
        submit(&mut book, sell_limit("1", "205"));

        let res = submit(&mut book, order(Side::Buy, OrderType::Ioc, "2", Some("201")));
        assert_eq!(res.status, OrderStatus::Partial);
        assert_eq!(filled_qty(&res), d("1"));
        assert_eq!(res.trades[0].price, d("200"));
    }

    #[test]
    fn fok_reject_leaves_book_unchanged() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "300"));
        let before = book.depth(10);

        let res = submit(&mut book, order(Side::Buy, OrderType::Fok, "2", Some("300")));
        assert_eq!(res.status, OrderStatus::Canceled);
        assert_eq!(res.reason.as_deref(), Some("fok_not_fillable"));
        assert!(res.trades.is_empty());

        let after = book.depth(10);
        assert_eq!(depth_pairs(&before.asks), depth_pairs(&after.asks));
        assert_eq!(depth_pairs(&before.bids), depth_pairs(&after.bids));
    }

    #[test]
    fn fok_on_empty_book_cancels() {
        let mut book = OrderBook::new("TST-USD");
        let res = submit(&mut book, order(Side::Buy, OrderType::Fok, "1", Some("300")));
        assert_eq!(res.status, OrderStatus::Canceled);
        assert_eq!(res.reason.as_deref(), Some("fok_not_fillable"));
    }

    #[test]
    fn fok_fills_across_levels() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "100"));
        submit(&mut book, sell_limit("1", "101"));

        let res = submit(&mut book, order(Side::Buy, OrderType::Fok, "2", Some("102")));
        assert_eq!(res.status, OrderStatus::Filled);
        assert_eq!(res.trades.len(), 2);
        assert_eq!(filled_qty(&res), d("2"));
    }

    #[test]
    fn fok_exact_quantity_fills_and_one_more_rejects() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("2", "100"));

        let res = submit(&mut book, order(Side::Buy, OrderType::Fok, "2.0001", Some("100")));
        assert_eq!(res.status, OrderStatus::Canceled);
        assert_eq!(res.reason.as_deref(), Some("fok_not_fillable"));

        let res = submit(&mut book, order(Side::Buy, OrderType::Fok, "2", Some("100")));
        assert_eq!(res.status, OrderStatus::Filled);
    }

    #[test]
    fn fok_ignores_levels_beyond_its_limit() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "100"));
        submit(&mut book, sell_limit("5", "110"));

        // plenty of liquidity at 110, but the limit stops at 100
        let res = submit(&mut book, order(Side::Buy, OrderType::Fok, "2", Some("100")));
        assert_eq!(res.status, OrderStatus::Canceled);
        assert_eq!(res.reason.as_deref(), Some("fok_not_fillable"));
    }

    #[test]
    fn fok_sell_sums_acceptable_bids() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, buy_limit("1", "100"));
        submit(&mut book, buy_limit("1", "99"));
        submit(&mut book, buy_limit("5", "90"));

        // only bids at or above 99 are acceptable
        let res = submit(&mut book, order(Side::Sell, OrderType::Fok, "2", Some("99")));
        assert_eq!(res.status, OrderStatus::Filled);
        assert_eq!(res.trades[0].price, d("100"));
        assert_eq!(res.trades[1].price, d("99"));
    }

    #[test]
    fn execution_price_is_the_makers() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "101"));

        let res = submit(&mut book, buy_limit("1", "105"));
        assert_eq!(res.status, OrderStatus::Filled);
        assert_eq!(res.trades[0].price, d("101"));
    }

    #[test]
    fn fifo_within_a_level() {
        let mut book = OrderBook::new("TST-USD");
        let first = sell_limit("1", "100");
        let second = sell_limit("1", "100");
        let first_id = first.id.clone();
        let second_id = second.id.clone();
        submit(&mut book, first);
        submit(&mut book, second);

        let res = submit(&mut book, buy_limit("1.5", "100"));
        assert_eq!(res.trades[0].maker_order_id, first_id);
        assert_eq!(res.trades[0].quantity, d("1"));
        assert_eq!(res.trades[1].maker_order_id, second_id);
        assert_eq!(res.trades[1].quantity, d("0.5"));
    }

    #[test]
    fn fees_are_value_times_rate() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("0.5", "30000"));

        let res = submit(&mut book, order(Side::Buy, OrderType::Market, "0.5", None));
        let t = &res.trades[0];
        assert_eq!(t.trade_value, d("15000"));
        assert_eq!(t.maker_fee, d("-3"));
        assert_eq!(t.taker_fee, d("15"));
        assert_eq!(t.aggressor_side, Side::Buy);
    }

    #[test]
    fn trade_seq_is_monotonic_and_in_trade_id() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "100"));
        submit(&mut book, sell_limit("1", "101"));
        let res = submit(&mut book, order(Side::Buy, OrderType::Market, "2", None));

        assert!(res.trades[0].trade_id.starts_with("TST-USD-1-"));
        assert!(res.trades[1].trade_id.starts_with("TST-USD-2-"));
        assert_eq!(book.trade_seq(), 2);
    }

    #[test]
    fn filled_quantity_never_exceeds_original() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("0.7", "100"));
        submit(&mut book, sell_limit("0.7", "101"));

        let res = submit(&mut book, buy_limit("1", "101"));
        assert_eq!(res.status, OrderStatus::Filled);
        assert_eq!(filled_qty(&res), d("1"));
    }

    #[test]
    fn cancel_restores_prior_depth() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "105"));
        let before = book.depth(10);

        let o = buy_limit("2", "104");
        let id = o.id.clone();
        submit(&mut book, o);
        assert!(book.contains_order(&id));

        let canceled = book.cancel(&id).unwrap();
        assert_eq!(canceled.remaining, d("2"));
        assert!(!book.contains_order(&id));

        let after = book.depth(10);
        assert_eq!(depth_pairs(&before.asks), depth_pairs(&after.asks));
        assert_eq!(depth_pairs(&before.bids), depth_pairs(&after.bids));
    }

    #[test]
    fn cancel_unknown_is_none() {
        let mut book = OrderBook::new("TST-USD");
        assert!(book.cancel("missing").is_none());
    }

    #[test]
    fn partially_filled_resting_order_cancels_with_its_remainder() {
        let mut book = OrderBook::new("TST-USD");
        let o = sell_limit("2", "100");
        let id = o.id.clone();
        submit(&mut book, o);
        submit(&mut book, order(Side::Buy, OrderType::Market, "0.5", None));

        let canceled = book.cancel(&id).unwrap();
        assert_eq!(canceled.remaining, d("1.5"));
        assert!(book.depth(10).asks.is_empty());
    }

    #[test]
    fn bbo_reports_level_totals() {
        let mut book = OrderBook::new("TST-USD");
        assert!(book.bbo().best_bid.is_none());
        assert!(book.bbo().best_ask.is_none());

        submit(&mut book, buy_limit("1", "99"));
        submit(&mut book, buy_limit("2", "99"));
        submit(&mut book, sell_limit("1", "101"));

        let bbo = book.bbo();
        assert_eq!(bbo.best_bid.unwrap(), ("99".to_string(), "3".to_string()));
        assert_eq!(bbo.best_ask.unwrap(), ("101".to_string(), "1".to_string()));
    }

    #[test]
    fn depth_orders_asks_up_bids_down_capped() {
        let mut book = OrderBook::new("TST-USD");
        for p in ["101", "102", "103"] {
            submit(&mut book, sell_limit("1", p));
        }
        for p in ["100", "99", "98"] {
            submit(&mut book, buy_limit("1", p));
        }

        let depth = book.depth(2);
        assert_eq!(
            depth_pairs(&depth.asks),
            vec![(d("101"), d("1")), (d("102"), d("1"))]
        );
        assert_eq!(
            depth_pairs(&depth.bids),
            vec![(d("100"), d("1")), (d("99"), d("1"))]
        );
    }

    #[test]
    fn buy_stop_triggers_at_or_above_trigger_price() {
        let mut book = OrderBook::new("TST-USD");
        book.place_stop(order(Side::Buy, OrderType::StopLoss, "1", Some("101")));

        submit(&mut book, sell_limit("1", "100"));
        let (_, triggered) = book.submit(order(Side::Buy, OrderType::Market, "1", None), None);
        assert!(triggered.is_empty(), "trade at 100 is below the 101 trigger");
        assert_eq!(book.stops().len(), 1);

        submit(&mut book, sell_limit("1", "101"));
        let (_, triggered) = book.submit(order(Side::Buy, OrderType::Market, "1", None), None);
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].order_type, OrderType::Market);
        assert!(triggered[0].price.is_none());
        assert!(book.stops().is_empty());
    }

    #[test]
    fn sell_stop_triggers_at_or_below_trigger_price() {
        let mut book = OrderBook::new("TST-USD");
        book.place_stop(order(Side::Sell, OrderType::StopLoss, "1", Some("95")));

        submit(&mut book, buy_limit("1", "96"));
        let (_, triggered) =
            book.submit(order(Side::Sell, OrderType::Market, "1", None), None);
        assert!(triggered.is_empty(), "trade at 96 is above the 95 trigger");

        submit(&mut book, buy_limit("1", "95"));
        let (_, triggered) =
            book.submit(order(Side::Sell, OrderType::Market, "1", None), None);
        assert_eq!(triggered.len(), 1);
    }

    #[test]
    fn stop_fires_once_even_with_multiple_qualifying_trades() {
        let mut book = OrderBook::new("TST-USD");
        book.place_stop(order(Side::Buy, OrderType::StopLoss, "1", Some("100")));

        submit(&mut book, sell_limit("1", "100"));
        submit(&mut book, sell_limit("1", "101"));
        let (_, triggered) = book.submit(order(Side::Buy, OrderType::Market, "2", None), None);
        assert_eq!(triggered.len(), 1);
    }

    #[test]
    fn stops_never_touch_the_sides() {
        let mut book = OrderBook::new("TST-USD");
        let stop = order(Side::Buy, OrderType::StopLoss, "1", Some("101"));
        let id = stop.id.clone();
        book.place_stop(stop);

        assert!(book.depth(10).asks.is_empty());
        assert!(book.depth(10).bids.is_empty());
        assert!(!book.contains_order(&id));
        assert_eq!(book.stops().len(), 1);

        assert!(book.cancel_stop(&id).is_some());
        assert!(book.cancel_stop(&id).is_none());
    }

    #[test]
    fn stoploss_submitted_directly_is_refused() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "100"));

        let res = submit(&mut book, order(Side::Buy, OrderType::StopLoss, "1", Some("100")));
        assert_eq!(res.status, OrderStatus::Canceled);
        assert!(res.trades.is_empty());
        assert_eq!(book.depth(10).asks.len(), 1);
    }

    struct Capture(Mutex<Vec<String>>);

    impl Broadcaster for Capture {
        fn on_trade(&self, trade: &Trade) {
            self.0.lock().unwrap().push(trade.trade_id.clone());
        }

        fn on_depth(&self, _symbol: &str, _depth: &DepthSnapshot) {}
    }

    #[test]
    fn broadcaster_sees_each_trade_in_execution_order() {
        let mut book = OrderBook::new("TST-USD");
        submit(&mut book, sell_limit("1", "100"));
        submit(&mut book, sell_limit("1", "101"));

        let capture = Capture(Mutex::new(Vec::new()));
        let (res, _) = book.submit(
            order(Side::Buy, OrderType::Market, "2", None),
            Some(&capture as &dyn Broadcaster),
        );

        let seen = capture.0.lock().unwrap();
        let expected: Vec<String> = res.trades.iter().map(|t| t.trade_id.clone()).collect();
        assert_eq!(*seen, expected);
        assert_eq!(seen.len(), 2);
    }
}
