// ============================================================================
// Domain Models Module
// Contains all core domain entities and value objects
// ============================================================================

pub mod config;
pub mod errors;
pub mod events;
pub mod order;
pub mod order_book;
pub mod outcome;
pub mod price_level;
pub mod trade;

pub use config::{
    DeliveryConfig, EngineConfig, InstrumentConfig, OverflowPolicy, MAX_ORDER_QUANTITY,
};
pub use errors::{ConfigError, InvariantViolation, RejectReason};
pub use events::OrderUpdate;
pub use order::{Order, OrderId, OrderIntent, OrderType, Price, Quantity, Side, TimeInForce};
pub use order_book::{OrderBook, OrderBookSide, OrderBookSnapshot};
pub use outcome::{CancelResult, ModifyRequest, ModifyResult, OrderResult, Rejection};
pub use price_level::PriceLevel;
pub use trade::Trade;

// Re-export state machine
pub use order::state::{OrderStatus, OrderTransition};
