// ============================================================================
// Price/Time Priority Matching Algorithm (FIFO)
// Most common in traditional exchanges (NASDAQ, NYSE, etc.)
// ============================================================================

use crate::domain::{InvariantViolation, Order, OrderBook};
use crate::interfaces::{Fill, Fills, MatchingAlgorithm};
use rust_decimal::Decimal;

/// Price/Time Priority (FIFO) matching algorithm
///
/// The best-priced opposite level is consumed first; within a level, orders
/// are matched in arrival order. Every fill executes at the maker's price.
///
/// # Example
/// ```text
/// Book:  50000 @ 1.0 BTC (Order A, seq=100)
///        50000 @ 2.0 BTC (Order B, seq=101)
///
/// Incoming: Buy 1.5 BTC @ 50000
/// Result: Match 1.0 with A, then 0.5 with B
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct PriceTimePriority;

impl PriceTimePriority {
    pub fn new() -> Self {
        Self
    }
}

impl MatchingAlgorithm for PriceTimePriority {
    fn match_order(
        &self,
        incoming: &mut Order,
        book: &mut OrderBook,
    ) -> Result<Fills, InvariantViolation> {
        let mut fills = Fills::new();
        let level_side = incoming.side.opposite();

        while incoming.remaining_quantity() > Decimal::ZERO {
            let (price, maker_remaining) = match book
                .best_opposite(incoming.side)
                .and_then(|level| level.front().map(|maker| (level.price(), maker)))
            {
                Some((price, maker)) => (price, maker.remaining_quantity()),
                None => break,
            };

            if !self.prices_cross(incoming, price) {
                break;
            }

            let quantity = incoming.remaining_quantity().min(maker_remaining);
            let maker = book.fill_best(level_side, quantity)?;
            incoming.apply_fill(quantity)?;

            fills.push(Fill {
                maker,
                price,
                quantity,
            });
        }

        Ok(fills)
    }

    fn name(&self) -> &str {
        "PriceTime"
    }
}
