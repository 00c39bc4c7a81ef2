// ============================================================================
// Trade Domain Model
// ============================================================================

use super::order::{OrderId, Price, Quantity, Side};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Represents a matched trade between two orders
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Trade {
    /// Unique trade identifier
    pub id: Uuid,

    pub symbol: Arc<str>,

    /// Execution price (always the maker's resting price)
    pub price: Price,

    /// Executed quantity
    pub quantity: Quantity,

    /// Order ID of the passive order (resting in book)
    pub maker_order_id: OrderId,

    /// Order ID of the aggressive order (incoming)
    pub taker_order_id: OrderId,

    /// Side of the aggressor
    pub taker_side: Side,

    /// Engine-wide event sequence number
    pub sequence: u64,

    /// Trade timestamp
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    pub fn new(
        symbol: Arc<str>,
        price: Price,
        quantity: Quantity,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        taker_side: Side,
        sequence: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol,
            price,
            quantity,
            maker_order_id,
            taker_order_id,
            taker_side,
            sequence,
            timestamp: Utc::now(),
        }
    }

    /// Notional value of the trade (price * quantity).
    ///
    /// `None` on decimal overflow.
    pub fn notional_value(&self) -> Option<Price> {
        self.price.checked_mul(self.quantity)
    }
}
