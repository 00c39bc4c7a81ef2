// ============================================================================
// Order Book Domain Model
// ============================================================================

use super::errors::InvariantViolation;
use super::order::{Order, OrderId, Price, Quantity, Side};
use super::price_level::PriceLevel;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Order Book Side
// ============================================================================

/// One side of the book: price levels sorted by price.
///
/// The map is always ascending; the bid side reads it from the back
/// (highest first) and the ask side from the front (lowest first).
#[derive(Debug, Clone)]
pub struct OrderBookSide {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
}

impl OrderBookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Get the best (top-of-book) price
    pub fn best_price(&self) -> Option<Price> {
        self.best_level().map(PriceLevel::price)
    }

    /// Get the best price level
    pub fn best_level(&self) -> Option<&PriceLevel> {
        match self.side {
            Side::Buy => self.levels.values().next_back(),
            Side::Sell => self.levels.values().next(),
        }
    }

    fn best_level_mut(&mut self) -> Option<&mut PriceLevel> {
        match self.side {
            Side::Buy => self.levels.values_mut().next_back(),
            Side::Sell => self.levels.values_mut().next(),
        }
    }

    /// Levels best first
    pub fn levels(&self) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match self.side {
            Side::Buy => Box::new(self.levels.values().rev()),
            Side::Sell => Box::new(self.levels.values()),
        }
    }

    pub fn level(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Get depth at N levels
    pub fn depth(&self, num_levels: usize) -> Vec<(Price, Quantity)> {
        self.levels()
            .take(num_levels)
            .map(|level| (level.price(), level.total_quantity()))
            .collect()
    }

    fn push(&mut self, price: Price, order: Order) -> Result<(), InvariantViolation> {
        self.levels
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
            .push(order)
    }

    fn remove(&mut self, price: Price, sequence: u64) -> Option<Order> {
        let level = self.levels.get_mut(&price)?;
        let order = level.remove(sequence)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(order)
    }

    fn fill_best(&mut self, quantity: Quantity) -> Result<Order, InvariantViolation> {
        self.best_level_mut()
            .ok_or(InvariantViolation::EmptyLevel { price: Decimal::ZERO })?
            .fill_front(quantity)
    }

    fn reduce(&mut self, price: Price, sequence: u64, new_remaining: Quantity) -> Option<Order> {
        self.levels.get_mut(&price)?.reduce(sequence, new_remaining)
    }
}

// ============================================================================
// Order Book
// ============================================================================

/// Where a resting order lives, for O(log n) cancel and modify
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Location {
    side: Side,
    price: Price,
    sequence: u64,
}

/// Resting orders of one instrument.
///
/// Not synchronized; the engine serializes access per instrument.
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: Arc<str>,
    bids: OrderBookSide,
    asks: OrderBookSide,
    index: HashMap<OrderId, Location>,
}

impl OrderBook {
    pub fn new(symbol: Arc<str>) -> Self {
        Self {
            symbol,
            bids: OrderBookSide::new(Side::Buy),
            asks: OrderBookSide::new(Side::Sell),
            index: HashMap::new(),
        }
    }

    pub fn symbol(&self) -> &Arc<str> {
        &self.symbol
    }

    pub fn bids(&self) -> &OrderBookSide {
        &self.bids
    }

    pub fn asks(&self) -> &OrderBookSide {
        &self.asks
    }

    fn side(&self, side: Side) -> &OrderBookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut OrderBookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Add a non-marketable remainder to the back of its price level.
    pub fn insert(&mut self, order: Order) -> Result<(), InvariantViolation> {
        if self.index.contains_key(&order.id) {
            return Err(InvariantViolation::DuplicateOrderId(order.id));
        }
        let price = match order.price {
            Some(price) if order.is_limit_order() => price,
            _ => return Err(InvariantViolation::NotRestable(order.id)),
        };

        let location = Location {
            side: order.side,
            price,
            sequence: order.sequence(),
        };
        let id = order.id;
        self.side_mut(order.side).push(price, order)?;
        self.index.insert(id, location);
        Ok(())
    }

    /// Best level on the side opposite to `side`
    pub fn best_opposite(&self, side: Side) -> Option<&PriceLevel> {
        self.side(side.opposite()).best_level()
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Fill the oldest order at the best level of `level_side`.
    ///
    /// Returns the maker's post-fill snapshot. A fully filled maker leaves
    /// the book together with its level if that empties.
    pub fn fill_best(
        &mut self,
        level_side: Side,
        quantity: Quantity,
    ) -> Result<Order, InvariantViolation> {
        let maker = self.side_mut(level_side).fill_best(quantity)?;
        if maker.remaining_quantity() == Decimal::ZERO {
            self.remove_filled(maker.id)?;
        }
        Ok(maker)
    }

    /// Take a fully filled order off the book, dropping its level if that
    /// empties. Orders with quantity left are not touched.
    pub fn remove_filled(&mut self, order_id: OrderId) -> Result<Order, InvariantViolation> {
        let remaining = self
            .get(order_id)
            .map(Order::remaining_quantity)
            .ok_or(InvariantViolation::UnknownOrder(order_id))?;
        if remaining > Decimal::ZERO {
            return Err(InvariantViolation::NotFilled(order_id));
        }
        self.take(order_id)
            .ok_or(InvariantViolation::UnknownOrder(order_id))
    }

    /// Cancel a resting order. `None` means not found.
    pub fn cancel(&mut self, order_id: OrderId) -> Option<Order> {
        let mut order = self.take(order_id)?;
        // Resting orders are always New or PartiallyFilled
        match order.cancel() {
            Ok(_) => Some(order),
            Err(_) => None,
        }
    }

    /// Remove an order without changing its status (cancel/replace path)
    pub(crate) fn take(&mut self, order_id: OrderId) -> Option<Order> {
        let location = self.index.remove(&order_id)?;
        self.side_mut(location.side)
            .remove(location.price, location.sequence)
    }

    /// Decrease a resting order's remaining quantity, keeping time priority.
    pub fn reduce_quantity(
        &mut self,
        order_id: OrderId,
        new_remaining: Quantity,
    ) -> Result<Order, InvariantViolation> {
        let location = *self
            .index
            .get(&order_id)
            .ok_or(InvariantViolation::UnknownOrder(order_id))?;
        let current = self
            .get(order_id)
            .map(Order::remaining_quantity)
            .ok_or(InvariantViolation::UnknownOrder(order_id))?;
        if new_remaining <= Decimal::ZERO || new_remaining > current {
            return Err(InvariantViolation::Overfill {
                order_id,
                remaining: current,
                requested: new_remaining,
            });
        }
        self.side_mut(location.side)
            .reduce(location.price, location.sequence, new_remaining)
            .ok_or(InvariantViolation::UnknownOrder(order_id))
    }

    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        let location = self.index.get(&order_id)?;
        self.side(location.side)
            .level(location.price)?
            .iter()
            .find(|order| order.sequence() == location.sequence)
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Number of resting orders
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// A crossed book is only legal in the middle of a matching step
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(bid), Some(ask)) if bid >= ask)
    }

    /// Quantity resting on the opposite side that an order of `taker_side`
    /// with `limit` (None = market) could reach, stopping once `cap` is met.
    pub fn crossing_liquidity(
        &self,
        taker_side: Side,
        limit: Option<Price>,
        cap: Quantity,
    ) -> Quantity {
        let mut available = Decimal::ZERO;
        for level in self.side(taker_side.opposite()).levels() {
            let crosses = match (taker_side, limit) {
                (_, None) => true,
                (Side::Buy, Some(limit)) => limit >= level.price(),
                (Side::Sell, Some(limit)) => limit <= level.price(),
            };
            if !crosses {
                break;
            }
            available = available.saturating_add(level.total_quantity());
            if available >= cap {
                break;
            }
        }
        available
    }

    pub fn depth(&self, side: Side, num_levels: usize) -> Vec<(Price, Quantity)> {
        self.side(side).depth(num_levels)
    }

    pub fn snapshot(&self, num_levels: usize) -> OrderBookSnapshot {
        OrderBookSnapshot::with_depth(
            self.symbol.to_string(),
            self.bids.depth(num_levels),
            self.asks.depth(num_levels),
        )
    }
}

// ============================================================================
// Order Book Snapshot
// ============================================================================

/// Immutable snapshot of the order book state
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderBookSnapshot {
    pub symbol: String,
    /// Bid levels (price, aggregate quantity), best first
    pub bids: Vec<(Price, Quantity)>,
    /// Ask levels (price, aggregate quantity), best first
    pub asks: Vec<(Price, Quantity)>,
    /// Current spread (ask - bid)
    pub spread: Option<Price>,
    /// Mid price
    pub mid_price: Option<Price>,
}

impl OrderBookSnapshot {
    pub fn with_depth(
        symbol: String,
        bids: Vec<(Price, Quantity)>,
        asks: Vec<(Price, Quantity)>,
    ) -> Self {
        let (spread, mid_price) = match (bids.first(), asks.first()) {
            (Some((bid, _)), Some((ask, _))) => (
                Some(ask - bid),
                bid.checked_add(*ask).map(|sum| sum / Decimal::from(2)),
            ),
            _ => (None, None),
        };

        Self {
            symbol,
            bids,
            asks,
            spread,
            mid_price,
        }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|(price, _)| *price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|(price, _)| *price)
    }

    pub fn total_bid_quantity(&self) -> Quantity {
        total(&self.bids)
    }

    pub fn total_ask_quantity(&self) -> Quantity {
        total(&self.asks)
    }
}

fn total(levels: &[(Price, Quantity)]) -> Quantity {
    levels
        .iter()
        .fold(Decimal::ZERO, |sum, (_, qty)| sum.saturating_add(*qty))
}
