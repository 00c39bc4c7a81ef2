// ============================================================================
// Basic Usage Example
// ============================================================================

use price_time_matching::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

fn main() {
    #[cfg(feature = "logging")]
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Matching Engine Example ===\n");

    let audit = Arc::new(MemorySink::new());
    let engine = MatchingEngineBuilder::new()
        .instrument(InstrumentConfig::crypto("BTC-USD"))
        .instrument(InstrumentConfig::equity("AAPL"))
        .order_update_sink(audit.clone())
        .trade_sink(Arc::new(LoggingSink))
        .build()
        .expect("valid configuration");

    println!("Instruments: {:?}\n", engine.instruments());

    // Add sell orders at different prices
    println!("Adding sell orders...");
    for i in 0i64..5 {
        engine
            .submit(OrderIntent::limit(
                "BTC-USD",
                Side::Sell,
                Decimal::from(50000 + i * 100),
                Decimal::ONE,
            ))
            .expect("valid order");
    }

    // Add buy orders
    println!("Adding buy orders...");
    let mut first_bid = None;
    for i in 0i64..5 {
        let result = engine
            .submit(OrderIntent::limit(
                "BTC-USD",
                Side::Buy,
                Decimal::from(49900 - i * 100),
                Decimal::ONE,
            ))
            .expect("valid order");
        first_bid.get_or_insert(result.order.id);
    }

    // Get order book snapshot
    println!("\n=== Order Book Snapshot ===");
    print_snapshot(&engine);

    // Limit IOC that crosses the first 3 ask levels
    println!("\n=== Submitting IOC Order ===");
    let ioc = engine
        .submit(
            OrderIntent::limit("BTC-USD", Side::Buy, Decimal::from(50200), Decimal::from(4))
                .with_time_in_force(TimeInForce::ImmediateOrCancel),
        )
        .expect("valid order");

    for trade in &ioc.trades {
        println!("  Trade: {} @ {} (qty: {})", trade.id, trade.price, trade.quantity);
    }
    println!(
        "  Order {} {:?}, filled {} avg {:?}",
        ioc.order.id,
        ioc.status(),
        ioc.filled_quantity(),
        ioc.average_price()
    );

    // Modify and cancel a resting bid
    if let Some(id) = first_bid {
        println!("\n=== Modify / Cancel ===");
        match engine.modify(id, ModifyRequest::price_and_quantity(Decimal::from(49950), Decimal::ONE)) {
            ModifyResult::Modified(result) => {
                println!("  Modified {} -> {:?} @ {:?}", id, result.status(), result.order.price)
            },
            other => println!("  Modify failed: {:?}", other),
        }
        println!("  Cancel: {}", engine.cancel(id).is_cancelled());
    }

    // Validation failures are reported, never matched
    println!("\n=== Rejections ===");
    let off_tick = OrderIntent::limit("AAPL", Side::Buy, Decimal::new(150005, 3), Decimal::ONE);
    if let Err(rejection) = engine.submit(off_tick) {
        println!("  {} ({})", rejection, rejection.reason.code());
    }

    // Final snapshot
    println!("\n=== Final Order Book ===");
    print_snapshot(&engine);
    println!("\nOrder updates delivered: {}", audit.order_updates().len());
}

fn print_snapshot(engine: &MatchingEngine) {
    let snapshot = match engine.get_snapshot("BTC-USD", 5) {
        Some(snapshot) => snapshot,
        None => return,
    };

    println!("\nBids:");
    for (price, qty) in &snapshot.bids {
        println!("  {} @ {}", qty, price);
    }

    println!("\nAsks:");
    for (price, qty) in &snapshot.asks {
        println!("  {} @ {}", qty, price);
    }

    println!("\nSpread: {:?}", snapshot.spread);
    println!("Mid Price: {:?}", snapshot.mid_price);
}
