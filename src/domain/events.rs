// ============================================================================
// Order Update Events
// ============================================================================

use super::errors::RejectReason;
use super::order::state::OrderStatus;
use super::order::{Order, OrderId, Quantity};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A status transition of one order, as seen by downstream consumers.
///
/// `sequence` shares the counter with [`Trade::sequence`](super::Trade), so a
/// consumer can merge both streams of one instrument back into emission order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderUpdate {
    pub order_id: OrderId,
    pub symbol: Arc<str>,
    pub status: OrderStatus,
    pub remaining_quantity: Quantity,
    pub filled_quantity: Quantity,
    /// Set only on `Rejected` updates
    pub reject_reason: Option<RejectReason>,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

impl OrderUpdate {
    pub fn from_order(order: &Order, sequence: u64) -> Self {
        Self {
            order_id: order.id,
            symbol: Arc::clone(&order.symbol),
            status: order.status(),
            remaining_quantity: order.remaining_quantity(),
            filled_quantity: order.filled_quantity(),
            reject_reason: None,
            timestamp: Utc::now(),
            sequence,
        }
    }

    pub fn rejected(order: &Order, reason: RejectReason, sequence: u64) -> Self {
        Self {
            reject_reason: Some(reason),
            ..Self::from_order(order, sequence)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
