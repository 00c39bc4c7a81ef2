// ============================================================================
// Operation Outcomes
// Synchronous results returned to the caller of submit/cancel/modify
// ============================================================================

use super::errors::RejectReason;
use super::order::state::OrderStatus;
use super::order::{Order, OrderId, Price, Quantity};
use super::trade::Trade;
use rust_decimal::Decimal;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Outcome of an accepted order: its final state after matching plus the
/// trades it produced, in execution order.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderResult {
    pub order: Order,
    pub trades: Vec<Trade>,
}

impl OrderResult {
    pub fn status(&self) -> OrderStatus {
        self.order.status()
    }

    pub fn filled_quantity(&self) -> Quantity {
        self.trades.iter().map(|trade| trade.quantity).sum()
    }

    /// Quantity-weighted average execution price, `None` without trades or
    /// when the notional does not fit a `Decimal`
    pub fn average_price(&self) -> Option<Price> {
        let filled = self.filled_quantity();
        if filled == Decimal::ZERO {
            return None;
        }
        let notional = self.trades.iter().try_fold(Decimal::ZERO, |sum, trade| {
            sum.checked_add(trade.notional_value()?)
        })?;
        Some(notional / filled)
    }

    /// Whether the order is resting in the book after this operation
    pub fn is_resting(&self) -> bool {
        self.order.status().can_be_cancelled()
    }
}

/// An intent refused at validation. The book was not touched.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rejection {
    pub order_id: OrderId,
    pub reason: RejectReason,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order {} rejected: {}", self.order_id, self.reason)
    }
}

impl std::error::Error for Rejection {}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CancelResult {
    /// Terminal snapshot of the cancelled order
    Cancelled(Order),
    /// Unknown id, or the order already reached a terminal state
    NotFound,
}

impl CancelResult {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CancelResult::Cancelled(_))
    }
}

/// Replacement parameters for a resting order.
///
/// `quantity` is the new remaining quantity; `price: None` keeps the
/// current price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModifyRequest {
    pub price: Option<Price>,
    pub quantity: Quantity,
}

impl ModifyRequest {
    pub fn quantity(quantity: Quantity) -> Self {
        Self {
            price: None,
            quantity,
        }
    }

    pub fn price_and_quantity(price: Price, quantity: Quantity) -> Self {
        Self {
            price: Some(price),
            quantity,
        }
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ModifyResult {
    /// The order after the modify, with any trades the re-entry produced
    Modified(OrderResult),
    NotFound,
    Rejected(RejectReason),
}

impl ModifyResult {
    pub fn is_modified(&self) -> bool {
        matches!(self, ModifyResult::Modified(_))
    }
}
