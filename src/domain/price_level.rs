// ============================================================================
// Price Level
// FIFO queue of resting orders at one exact price
// ============================================================================

use super::errors::InvariantViolation;
use super::order::{Order, Price, Quantity};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Orders at a single price, kept in arrival order.
///
/// Orders are keyed by their arrival sequence number, so iteration order is
/// time priority and removal of an arbitrary order is O(log n). A re-queued
/// order carries a fresh (larger) sequence and therefore lands at the back.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Price,
    orders: BTreeMap<u64, Order>,
    total_quantity: Quantity,
}

impl PriceLevel {
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: BTreeMap::new(),
            total_quantity: Decimal::ZERO,
        }
    }

    pub fn price(&self) -> Price {
        self.price
    }

    /// Aggregate remaining quantity of all orders at this level
    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Oldest order at this level
    pub fn front(&self) -> Option<&Order> {
        self.orders.values().next()
    }

    /// Orders in time priority
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub(crate) fn push(&mut self, order: Order) -> Result<(), InvariantViolation> {
        if order.remaining_quantity() <= Decimal::ZERO {
            return Err(InvariantViolation::NotRestable(order.id));
        }
        if self.orders.contains_key(&order.sequence()) {
            return Err(InvariantViolation::DuplicateOrderId(order.id));
        }
        self.total_quantity = self
            .total_quantity
            .checked_add(order.remaining_quantity())
            .ok_or(InvariantViolation::QuantityOverflow { price: self.price })?;
        self.orders.insert(order.sequence(), order);
        Ok(())
    }

    pub(crate) fn remove(&mut self, sequence: u64) -> Option<Order> {
        let order = self.orders.remove(&sequence)?;
        self.total_quantity -= order.remaining_quantity();
        Some(order)
    }

    /// Fill the oldest order and return its post-fill snapshot. A fully
    /// filled maker stays at the front until it is removed.
    pub(crate) fn fill_front(&mut self, quantity: Quantity) -> Result<Order, InvariantViolation> {
        let maker = self
            .orders
            .values_mut()
            .next()
            .ok_or(InvariantViolation::EmptyLevel { price: self.price })?;

        maker.apply_fill(quantity)?;
        self.total_quantity -= quantity;
        Ok(maker.clone())
    }

    /// Decrease an order's remaining quantity in place, keeping its priority.
    pub(crate) fn reduce(
        &mut self,
        sequence: u64,
        new_remaining: Quantity,
    ) -> Option<Order> {
        let order = self.orders.get_mut(&sequence)?;
        let old_remaining = order.remaining_quantity();
        order.set_remaining_quantity(new_remaining);
        self.total_quantity = self.total_quantity - old_remaining + new_remaining;
        Some(order.clone())
    }
}
