// ============================================================================
// Matching Algorithm Interface
// Defines the contract for pluggable matching algorithms
// ============================================================================

use crate::domain::{InvariantViolation, Order, OrderBook, Price, Quantity, Side};
use smallvec::SmallVec;

/// One execution against a resting order
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    /// Maker snapshot after the fill
    pub maker: Order,
    pub price: Price,
    pub quantity: Quantity,
}

/// Most takers fill against a handful of makers
pub type Fills = SmallVec<[Fill; 8]>;

/// Strategy pattern interface for matching algorithms
pub trait MatchingAlgorithm: Send + Sync {
    /// Match an incoming order against the opposite side of the book.
    ///
    /// Mutates both the incoming order and the resting makers; returns the
    /// fills in execution order. The caller owns the book exclusively for
    /// the duration of the call.
    fn match_order(
        &self,
        incoming: &mut Order,
        book: &mut OrderBook,
    ) -> Result<Fills, InvariantViolation>;

    /// Get the algorithm name for logging
    fn name(&self) -> &str;

    /// Check if an incoming order can trade at `book_price`.
    /// Market orders cross any price.
    fn prices_cross(&self, incoming: &Order, book_price: Price) -> bool {
        match (incoming.side, incoming.price) {
            (_, None) => true,
            (Side::Buy, Some(limit)) => limit >= book_price,
            (Side::Sell, Some(limit)) => limit <= book_price,
        }
    }
}
