// ============================================================================
// Domain Errors
// Validation rejections, core invariant violations, configuration errors
// ============================================================================

use super::order::state::{OrderStatus, OrderTransition};
use super::order::{OrderId, Price, Quantity};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Rejection reasons
// ============================================================================

/// Why an order intent (or a modify request) was refused before touching
/// the book. Reported synchronously to the caller and carried on the
/// `Rejected` order update.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RejectReason {
    UnknownSymbol(String),
    NonPositiveQuantity,
    NonPositivePrice,
    MissingLimitPrice,
    MarketOrderWithPrice,
    TickSizeViolation { price: Price, tick_size: Price },
    LotSizeViolation { quantity: Quantity, lot_size: Quantity },
    QuantityBelowMinimum { quantity: Quantity, minimum: Quantity },
    QuantityAboveMaximum { quantity: Quantity, maximum: Quantity },
    DuplicateOrderId(OrderId),
}

impl RejectReason {
    /// Stable machine-readable code for the request layer
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::UnknownSymbol(_) => "UNKNOWN_SYMBOL",
            RejectReason::NonPositiveQuantity => "NON_POSITIVE_QUANTITY",
            RejectReason::NonPositivePrice => "NON_POSITIVE_PRICE",
            RejectReason::MissingLimitPrice => "MISSING_LIMIT_PRICE",
            RejectReason::MarketOrderWithPrice => "MARKET_ORDER_WITH_PRICE",
            RejectReason::TickSizeViolation { .. } => "TICK_SIZE_VIOLATION",
            RejectReason::LotSizeViolation { .. } => "LOT_SIZE_VIOLATION",
            RejectReason::QuantityBelowMinimum { .. } => "QUANTITY_BELOW_MINIMUM",
            RejectReason::QuantityAboveMaximum { .. } => "QUANTITY_ABOVE_MAXIMUM",
            RejectReason::DuplicateOrderId(_) => "DUPLICATE_ORDER_ID",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnknownSymbol(symbol) => write!(f, "unknown symbol: {}", symbol),
            RejectReason::NonPositiveQuantity => write!(f, "quantity must be positive"),
            RejectReason::NonPositivePrice => write!(f, "price must be positive"),
            RejectReason::MissingLimitPrice => write!(f, "limit orders must have a price"),
            RejectReason::MarketOrderWithPrice => write!(f, "market orders must not carry a price"),
            RejectReason::TickSizeViolation { price, tick_size } => {
                write!(f, "price {} is not a multiple of tick size {}", price, tick_size)
            },
            RejectReason::LotSizeViolation { quantity, lot_size } => {
                write!(f, "quantity {} is not a multiple of lot size {}", quantity, lot_size)
            },
            RejectReason::QuantityBelowMinimum { quantity, minimum } => {
                write!(f, "quantity {} is below minimum {}", quantity, minimum)
            },
            RejectReason::QuantityAboveMaximum { quantity, maximum } => {
                write!(f, "quantity {} is above maximum {}", quantity, maximum)
            },
            RejectReason::DuplicateOrderId(id) => write!(f, "order id {} is already live", id),
        }
    }
}

impl std::error::Error for RejectReason {}

// ============================================================================
// Invariant violations
// ============================================================================

/// A broken core invariant. Never produced under correct use; the engine
/// treats any of these as fatal to the operation in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    DuplicateOrderId(OrderId),
    /// Market orders and orders with nothing left cannot rest
    NotRestable(OrderId),
    UnknownOrder(OrderId),
    /// Only orders with nothing left can be removed as filled
    NotFilled(OrderId),
    EmptyLevel { price: Price },
    QuantityOverflow { price: Price },
    Overfill {
        order_id: OrderId,
        remaining: Quantity,
        requested: Quantity,
    },
    IllegalTransition {
        from: OrderStatus,
        via: OrderTransition,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::DuplicateOrderId(id) => {
                write!(f, "order {} is already in the book", id)
            },
            InvariantViolation::NotRestable(id) => write!(f, "order {} cannot rest in the book", id),
            InvariantViolation::UnknownOrder(id) => write!(f, "order {} is not in the book", id),
            InvariantViolation::NotFilled(id) => write!(f, "order {} is not fully filled", id),
            InvariantViolation::EmptyLevel { price } => {
                write!(f, "price level {} has no orders", price)
            },
            InvariantViolation::QuantityOverflow { price } => {
                write!(f, "aggregate quantity at level {} overflows", price)
            },
            InvariantViolation::Overfill {
                order_id,
                remaining,
                requested,
            } => write!(
                f,
                "fill of {} exceeds remaining {} on order {}",
                requested, remaining, order_id
            ),
            InvariantViolation::IllegalTransition { from, via } => {
                write!(f, "invalid transition from {:?} via {:?}", from, via)
            },
        }
    }
}

impl std::error::Error for InvariantViolation {}

// ============================================================================
// Configuration errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptySymbol,
    DuplicateSymbol(String),
    NonPositiveTickSize(String),
    NonPositiveLotSize(String),
    InvalidQuantityBounds(String),
    ZeroCapacity,
    Parse(String),
    Spawn(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptySymbol => write!(f, "instrument symbol cannot be empty"),
            ConfigError::DuplicateSymbol(symbol) => {
                write!(f, "instrument {} is already registered", symbol)
            },
            ConfigError::NonPositiveTickSize(symbol) => {
                write!(f, "tick size for {} must be positive", symbol)
            },
            ConfigError::NonPositiveLotSize(symbol) => {
                write!(f, "lot size for {} must be positive", symbol)
            },
            ConfigError::InvalidQuantityBounds(symbol) => write!(
                f,
                "quantity bounds for {} must be positive and min <= max",
                symbol
            ),
            ConfigError::ZeroCapacity => write!(f, "delivery queue capacity must be positive"),
            ConfigError::Parse(msg) => write!(f, "could not parse configuration: {}", msg),
            ConfigError::Spawn(msg) => write!(f, "could not start delivery worker: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
