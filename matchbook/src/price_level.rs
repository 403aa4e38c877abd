//! A single price level: the FIFO queue of orders resting at one price.

use crate::types::Order;
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Orders resting at one price on one side of a book, oldest first, plus the
/// cached sum of their remaining quantities.
///
/// `total` is kept in lockstep with every mutation and is the authoritative
/// value for depth queries.
#[derive(Debug, Default)]
pub struct PriceLevel {
    queue: VecDeque<Order>,
    total: Decimal,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an order at the tail of the queue.
    pub fn add(&mut self, order: Order) {
        self.total += order.remaining;
        self.queue.push_back(order);
    }

    /// The oldest resting order, if any.
    pub fn peek_oldest(&self) -> Option<&Order> {
        self.queue.front()
    }

    /// Shrinks the head order's remaining quantity by `amount`, popping it
    /// once it reaches zero. Returns the popped order when that happens.
    ///
    /// `amount` must not exceed the head's remaining quantity.
    pub fn decrease_oldest(&mut self, amount: Decimal) -> Option<Order> {
        let head = self.queue.front_mut()?;
        head.remaining -= amount;
        self.total -= amount;
        if head.remaining.is_zero() {
            self.queue.pop_front()
        } else {
            None
        }
    }

    /// Removes an order anywhere in the queue by id. Linear scan; only the
    /// cancel and modify paths use this, the matcher works on the head.
    pub fn remove(&mut self, order_id: &str) -> Option<Order> {
        let idx = self.queue.iter().position(|o| o.id == order_id)?;
        let order = self.queue.remove(idx)?;
        self.total -= order.remaining;
        Some(order)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Cached sum of remaining quantity across the queue.
    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.queue.iter()
    }
}
