// ============================================================================
// Order Domain Model
// ============================================================================

use super::errors::InvariantViolation;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Limit and execution price. Exact decimal, never a float.
pub type Price = Decimal;

/// Order and trade quantity.
pub type Quantity = Decimal;

// ============================================================================
// Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TimeInForce {
    /// Remains in the book until filled or cancelled
    #[default]
    GoodTillCancel,
    /// Match what is possible immediately, cancel the remainder
    ImmediateOrCancel,
    /// Fill the entire quantity immediately or cancel without trading
    FillOrKill,
}

// ============================================================================
// Order State Machine
// ============================================================================

pub mod state {
    use crate::domain::errors::InvariantViolation;

    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum OrderStatus {
        New,
        PartiallyFilled,
        Filled,
        Cancelled,
        Rejected,
    }

    impl OrderStatus {
        pub fn is_terminal(&self) -> bool {
            matches!(
                self,
                OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
            )
        }

        pub fn can_be_cancelled(&self) -> bool {
            matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
        }
    }

    /// Valid state transitions for the order state machine
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum OrderTransition {
        Reject,
        PartialFill,
        Fill,
        Cancel,
    }

    impl OrderStatus {
        pub fn transition(
            &self,
            transition: OrderTransition,
        ) -> Result<OrderStatus, InvariantViolation> {
            match (self, transition) {
                (OrderStatus::New, OrderTransition::Reject) => Ok(OrderStatus::Rejected),

                (OrderStatus::New | OrderStatus::PartiallyFilled, OrderTransition::PartialFill) => {
                    Ok(OrderStatus::PartiallyFilled)
                },
                (OrderStatus::New | OrderStatus::PartiallyFilled, OrderTransition::Fill) => {
                    Ok(OrderStatus::Filled)
                },
                (OrderStatus::New | OrderStatus::PartiallyFilled, OrderTransition::Cancel) => {
                    Ok(OrderStatus::Cancelled)
                },

                (from, via) => Err(InvariantViolation::IllegalTransition { from: *from, via }),
            }
        }
    }
}

use state::{OrderStatus, OrderTransition};

// ============================================================================
// Order Intent
// ============================================================================

/// What a caller asks the engine to do. Becomes an [`Order`] once accepted.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderIntent {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Price>,
    pub quantity: Quantity,
    #[cfg_attr(feature = "serde", serde(default))]
    pub time_in_force: TimeInForce,
    /// Caller-assigned identifier; the engine assigns one when absent
    #[cfg_attr(feature = "serde", serde(default))]
    pub order_id: Option<OrderId>,
}

impl OrderIntent {
    pub fn limit(symbol: impl Into<String>, side: Side, price: Price, quantity: Quantity) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            quantity,
            time_in_force: TimeInForce::GoodTillCancel,
            order_id: None,
        }
    }

    pub fn market(symbol: impl Into<String>, side: Side, quantity: Quantity) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            price: None,
            quantity,
            time_in_force: TimeInForce::ImmediateOrCancel,
            order_id: None,
        }
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }
}

// ============================================================================
// Order Entity
// ============================================================================

/// An accepted order. Mutated only by the engine while it holds the
/// order's book exclusively, so plain fields suffice.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Order {
    pub id: OrderId,
    pub symbol: Arc<str>,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub price: Option<Price>,
    /// Original quantity (adjusted by modify so that filled = quantity - remaining)
    pub quantity: Quantity,
    pub timestamp: DateTime<Utc>,

    remaining_quantity: Quantity,
    status: OrderStatus,
    sequence: u64,
}

impl Order {
    pub fn new(
        id: OrderId,
        symbol: Arc<str>,
        side: Side,
        order_type: OrderType,
        time_in_force: TimeInForce,
        price: Option<Price>,
        quantity: Quantity,
    ) -> Self {
        Self {
            id,
            symbol,
            side,
            order_type,
            time_in_force,
            price,
            quantity,
            timestamp: Utc::now(),
            remaining_quantity: quantity,
            status: OrderStatus::New,
            sequence: 0,
        }
    }

    pub fn from_intent(id: OrderId, symbol: Arc<str>, intent: &OrderIntent) -> Self {
        Self::new(
            id,
            symbol,
            intent.side,
            intent.order_type,
            intent.time_in_force,
            intent.price,
            intent.quantity,
        )
    }

    // ========================================================================
    // Getters
    // ========================================================================

    pub fn remaining_quantity(&self) -> Quantity {
        self.remaining_quantity
    }

    pub fn filled_quantity(&self) -> Quantity {
        self.quantity - self.remaining_quantity
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Arrival sequence number; lower means earlier in time priority
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_market_order(&self) -> bool {
        matches!(self.order_type, OrderType::Market)
    }

    pub fn is_limit_order(&self) -> bool {
        matches!(self.order_type, OrderType::Limit)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    /// Apply a fill and advance the state machine.
    pub fn apply_fill(&mut self, quantity: Quantity) -> Result<OrderStatus, InvariantViolation> {
        if quantity <= Decimal::ZERO || quantity > self.remaining_quantity {
            return Err(InvariantViolation::Overfill {
                order_id: self.id,
                remaining: self.remaining_quantity,
                requested: quantity,
            });
        }

        let transition = if quantity == self.remaining_quantity {
            OrderTransition::Fill
        } else {
            OrderTransition::PartialFill
        };
        self.status = self.status.transition(transition)?;
        self.remaining_quantity -= quantity;
        Ok(self.status)
    }

    pub fn cancel(&mut self) -> Result<OrderStatus, InvariantViolation> {
        self.status = self.status.transition(OrderTransition::Cancel)?;
        Ok(self.status)
    }

    pub fn reject(&mut self) -> Result<OrderStatus, InvariantViolation> {
        self.status = self.status.transition(OrderTransition::Reject)?;
        Ok(self.status)
    }

    /// Replace the remaining quantity, keeping the filled amount intact.
    /// Status is unchanged: a modified order stays New or PartiallyFilled.
    pub(crate) fn set_remaining_quantity(&mut self, remaining: Quantity) {
        let filled = self.filled_quantity();
        self.remaining_quantity = remaining;
        self.quantity = filled + remaining;
    }
}
