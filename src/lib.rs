// ============================================================================
// Price-Time Matching Library
// Multi-instrument order matching core with ordered event delivery
// ============================================================================

//! # Price-Time Matching
//!
//! The matching core of an exchange-style trading service: it keeps one
//! limit order book per instrument, matches crossing orders under strict
//! price-time priority, and emits trades and order status updates.
//!
//! ## Features
//!
//! - **Price-time priority** with execution at the resting order's price
//! - **Per-instrument locking**: different instruments never contend
//! - **Ordered delivery**: sinks see each instrument's events in emission order
//! - **Exact decimal arithmetic** via `rust_decimal`
//! - **Queue-backed sinks** with a dedicated worker per consumer
//!
//! ## Example
//!
//! ```rust
//! use price_time_matching::prelude::*;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! let audit = Arc::new(MemorySink::new());
//! let engine = MatchingEngineBuilder::new()
//!     .instrument(InstrumentConfig::crypto("BTC-USD"))
//!     .order_update_sink(audit.clone())
//!     .trade_sink(audit.clone())
//!     .build()
//!     .unwrap();
//!
//! engine
//!     .submit(OrderIntent::limit("BTC-USD", Side::Sell, Decimal::from(50000), Decimal::ONE))
//!     .unwrap();
//! let buy = engine
//!     .submit(OrderIntent::limit("BTC-USD", Side::Buy, Decimal::from(50100), Decimal::ONE))
//!     .unwrap();
//!
//! // Executed at the resting price
//! assert_eq!(buy.trades[0].price, Decimal::from(50000));
//! assert_eq!(buy.status(), OrderStatus::Filled);
//!
//! let snapshot = engine.get_snapshot("BTC-USD", 10).unwrap();
//! println!("Best bid: {:?}", snapshot.best_bid());
//! println!("Best ask: {:?}", snapshot.best_ask());
//! ```

pub mod delivery;
pub mod domain;
pub mod engine;
pub mod interfaces;

// Re-exports for convenience
pub mod prelude {
    #[cfg(feature = "async")]
    pub use crate::delivery::TokioSink;
    pub use crate::delivery::{ChannelSink, DeliveryStats};
    pub use crate::domain::{
        CancelResult, ConfigError, DeliveryConfig, EngineConfig, InstrumentConfig, ModifyRequest,
        ModifyResult, Order, OrderBookSnapshot, OrderId, OrderIntent, OrderResult, OrderStatus,
        OrderType, OrderUpdate, OverflowPolicy, Price, Quantity, RejectReason, Rejection, Side,
        TimeInForce, Trade,
    };
    pub use crate::engine::{
        create_from_config, create_with_channels, MatchingEngine, MatchingEngineBuilder,
        PriceTimePriority,
    };
    pub use crate::interfaces::{
        LoggingSink, MatchingAlgorithm, MemorySink, NoOpSink, OrderUpdateSink, TradeSink,
    };
}

#[cfg(test)]
mod integration_tests {
    use super::prelude::*;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn engine(symbols: &[&str]) -> (Arc<MatchingEngine>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let engine = MatchingEngineBuilder::new()
            .instruments(symbols.iter().map(|s| InstrumentConfig::new(*s)))
            .order_update_sink(sink.clone())
            .trade_sink(sink.clone())
            .build()
            .unwrap();
        (Arc::new(engine), sink)
    }

    #[test]
    fn test_end_to_end_matching() {
        let (engine, sink) = engine(&["BTC-USD"]);

        let sell = engine
            .submit(OrderIntent::limit("BTC-USD", Side::Sell, Decimal::from(50000), Decimal::ONE))
            .unwrap();
        assert_eq!(sell.status(), OrderStatus::New);
        assert!(sell.is_resting());

        let buy = engine
            .submit(OrderIntent::limit("BTC-USD", Side::Buy, Decimal::from(50000), Decimal::ONE))
            .unwrap();
        assert_eq!(buy.trades.len(), 1);
        assert_eq!(buy.status(), OrderStatus::Filled);

        let snapshot = engine.get_snapshot("BTC-USD", 10).unwrap();
        assert!(snapshot.bids.is_empty());
        assert!(snapshot.asks.is_empty());

        // New, then trade + maker Filled + taker Filled
        assert_eq!(sink.order_updates().len(), 3);
        assert_eq!(sink.trades()[0].maker_order_id, sell.order.id);
    }

    #[test]
    fn test_concurrent_same_instrument_conserves_quantity() {
        let (engine, sink) = engine(&["BTC-USD"]);
        let threads = 8;
        let per_thread = 200;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..per_thread {
                        let side = if (t + i) % 2 == 0 { Side::Buy } else { Side::Sell };
                        let price = Decimal::from(100 + ((t * 7 + i * 3) % 5) as i64);
                        let quantity = Decimal::from(1 + (i % 4) as i64);
                        engine
                            .submit(OrderIntent::limit("BTC-USD", side, price, quantity))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let trades = sink.trades();
        let updates = sink.order_updates();

        // Sink order is sequence order for a single instrument
        let mut all: Vec<u64> = updates.iter().map(|u| u.sequence).collect();
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        let trade_sequences: Vec<u64> = trades.iter().map(|t| t.sequence).collect();
        assert!(trade_sequences.windows(2).all(|w| w[0] < w[1]));
        all.extend(trade_sequences);
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), updates.len() + trades.len());

        let mut last: HashMap<OrderId, &OrderUpdate> = HashMap::new();
        for update in &updates {
            last.insert(update.order_id, update);
        }
        assert_eq!(last.len(), threads * per_thread);

        let traded: Decimal = trades.iter().map(|t| t.quantity).sum();
        let filled: Decimal = last.values().map(|u| u.filled_quantity).sum();
        assert_eq!(filled, traded * Decimal::from(2));

        let snapshot = engine.get_snapshot("BTC-USD", usize::MAX).unwrap();
        let resting: Decimal = last
            .values()
            .filter(|u| !u.is_terminal())
            .map(|u| u.remaining_quantity)
            .sum();
        assert_eq!(
            snapshot.total_bid_quantity() + snapshot.total_ask_quantity(),
            resting
        );
        if let (Some(bid), Some(ask)) = (snapshot.best_bid(), snapshot.best_ask()) {
            assert!(bid < ask);
        }
    }

    #[test]
    fn test_instruments_are_independent() {
        let symbols = ["AAA", "BBB", "CCC", "DDD"];
        let (engine, sink) = engine(&symbols);

        let handles: Vec<_> = symbols
            .iter()
            .map(|symbol| {
                let engine = Arc::clone(&engine);
                let symbol = symbol.to_string();
                thread::spawn(move || {
                    for _ in 0..100 {
                        engine
                            .submit(OrderIntent::limit(&symbol, Side::Sell, Decimal::from(10), Decimal::ONE))
                            .unwrap();
                        engine
                            .submit(OrderIntent::limit(&symbol, Side::Buy, Decimal::from(10), Decimal::ONE))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let trades = sink.trades();
        assert_eq!(trades.len(), symbols.len() * 100);
        for symbol in symbols {
            let count = trades.iter().filter(|t| &*t.symbol == symbol).count();
            assert_eq!(count, 100);

            // Per-instrument delivery follows sequence order
            let sequences: Vec<u64> = sink
                .order_updates()
                .iter()
                .filter(|u| &*u.symbol == symbol)
                .map(|u| u.sequence)
                .collect();
            assert!(sequences.windows(2).all(|w| w[0] < w[1]));

            assert_eq!(engine.best_bid_ask(symbol), Some((None, None)));
        }
    }

    #[test]
    fn test_concurrent_cancel_races_fill() {
        let (engine, sink) = engine(&["BTC-USD"]);
        let makers: Vec<OrderId> = (0..200)
            .map(|_| {
                engine
                    .submit(OrderIntent::limit("BTC-USD", Side::Sell, Decimal::from(10), Decimal::ONE))
                    .unwrap()
                    .order
                    .id
            })
            .collect();

        let canceller = {
            let engine = Arc::clone(&engine);
            let makers = makers.clone();
            thread::spawn(move || {
                makers
                    .iter()
                    .filter(|id| engine.cancel(**id).is_cancelled())
                    .count()
            })
        };
        let taker = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                (0..200)
                    .map(|_| {
                        engine
                            .submit(OrderIntent::market("BTC-USD", Side::Buy, Decimal::ONE))
                            .unwrap()
                            .filled_quantity()
                    })
                    .sum::<Decimal>()
            })
        };

        let cancelled = canceller.join().unwrap();
        let bought = taker.join().unwrap();

        // Every maker ends exactly once: filled or cancelled
        assert_eq!(Decimal::from(cancelled as i64) + bought, Decimal::from(200));
        for id in makers {
            let terminal = sink
                .order_updates()
                .iter()
                .filter(|u| u.order_id == id && u.is_terminal())
                .count();
            assert_eq!(terminal, 1);
        }
    }
}
