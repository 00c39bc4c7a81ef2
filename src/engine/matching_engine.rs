// ============================================================================
// Matching Engine
// Core business logic for order matching
// ============================================================================

use super::registry::{BookSlot, Registry};
use crate::domain::{
    CancelResult, ConfigError, InstrumentConfig, InvariantViolation, ModifyRequest, ModifyResult,
    Order, OrderBook, OrderBookSnapshot, OrderId, OrderIntent, OrderResult, OrderStatus,
    OrderType, OrderUpdate, Price, RejectReason, Rejection, TimeInForce, Trade,
};
use crate::interfaces::{MatchingAlgorithm, OrderUpdateSink, TradeSink};
use crossbeam_skiplist::SkipMap;
use rust_decimal::Decimal;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Where a live order id is routed, and which arrival reserved it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Route {
    slot: usize,
    arrival: u64,
}

/// Events produced by one operation, in production order
enum EngineEvent {
    Trade(Trade),
    Update(OrderUpdate),
}

/// Collects the events of one exclusive section and stamps them with the
/// engine-wide event sequence.
struct Emitter<'a> {
    sequence: &'a AtomicU64,
    events: Vec<EngineEvent>,
}

impl<'a> Emitter<'a> {
    fn new(sequence: &'a AtomicU64) -> Self {
        Self {
            sequence,
            events: Vec::new(),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn update(&mut self, order: &Order) {
        let update = OrderUpdate::from_order(order, self.next_sequence());
        self.events.push(EngineEvent::Update(update));
    }

    fn rejected(&mut self, order: &Order, reason: RejectReason) {
        let update = OrderUpdate::rejected(order, reason, self.next_sequence());
        self.events.push(EngineEvent::Update(update));
    }

    fn trade(&mut self, taker: &Order, maker_id: OrderId, price: Price, quantity: Decimal) -> Trade {
        let trade = Trade::new(
            Arc::clone(&taker.symbol),
            price,
            quantity,
            maker_id,
            taker.id,
            taker.side,
            self.next_sequence(),
        );
        self.events.push(EngineEvent::Trade(trade.clone()));
        trade
    }
}

/// Abort the operation in progress. Runs before any of its events reach
/// a sink.
fn invariant_violated(violation: InvariantViolation) -> ! {
    tracing::error!(%violation, "matching invariant violated");
    panic!("matching invariant violated: {}", violation)
}

/// Multi-instrument price-time matching engine.
///
/// Each instrument's book is mutated under its own lock; operations on
/// different instruments run in parallel. Events are delivered after the
/// book lock is released, in emission order per instrument.
pub struct MatchingEngine {
    registry: Registry,

    /// Live order id -> owning book, for cancel/modify by id
    routes: SkipMap<OrderId, Route>,

    /// Pluggable matching algorithm
    algorithm: Box<dyn MatchingAlgorithm>,

    order_sink: Arc<dyn OrderUpdateSink>,
    trade_sink: Arc<dyn TradeSink>,

    /// Stamps trades and order updates
    event_sequence: AtomicU64,

    /// Stamps accepted orders for time priority
    arrival_sequence: AtomicU64,
}

impl MatchingEngine {
    /// Create an engine with no instruments
    pub fn new(
        algorithm: Box<dyn MatchingAlgorithm>,
        order_sink: Arc<dyn OrderUpdateSink>,
        trade_sink: Arc<dyn TradeSink>,
    ) -> Self {
        Self {
            registry: Registry::new(),
            routes: SkipMap::new(),
            algorithm,
            order_sink,
            trade_sink,
            event_sequence: AtomicU64::new(0),
            arrival_sequence: AtomicU64::new(0),
        }
    }

    /// Register an instrument. Instruments are never removed.
    pub fn add_instrument(&self, config: InstrumentConfig) -> Result<(), ConfigError> {
        let slot = self.registry.register(config)?;
        tracing::info!(
            symbol = %slot.symbol,
            index = slot.index,
            algorithm = self.algorithm.name(),
            "instrument registered"
        );
        Ok(())
    }

    // ========================================================================
    // Order entry
    // ========================================================================

    /// Submit an order intent.
    ///
    /// Valid intents are matched against the opposite side; the returned
    /// [`OrderResult`] carries the order's final state and its trades.
    /// Invalid intents never touch the book and come back as a
    /// [`Rejection`] (a `Rejected` order update is emitted as well). An id
    /// that is already live is refused without any update, since that id's
    /// event stream belongs to the live order.
    pub fn submit(&self, intent: OrderIntent) -> Result<OrderResult, Rejection> {
        let order_id = intent.order_id.unwrap_or_default();

        let slot = match self.registry.lookup(&intent.symbol) {
            Some(slot) => slot,
            None => {
                let symbol: Arc<str> = Arc::from(intent.symbol.as_str());
                let reason = RejectReason::UnknownSymbol(intent.symbol.clone());
                return Err(self.reject(None, Order::from_intent(order_id, symbol, &intent), reason));
            },
        };

        let mut order = Order::from_intent(order_id, Arc::clone(&slot.symbol), &intent);
        if let Err(reason) = validate_intent(&slot.config, &intent) {
            return Err(self.reject(Some(&slot), order, reason));
        }

        let arrival = self.arrival_sequence.fetch_add(1, Ordering::AcqRel) + 1;
        let route = Route {
            slot: slot.index,
            arrival,
        };
        if *self.routes.get_or_insert(order_id, route).value() != route {
            let reason = RejectReason::DuplicateOrderId(order_id);
            tracing::warn!(
                symbol = %slot.symbol,
                order_id = %order_id,
                code = reason.code(),
                "order rejected"
            );
            return Err(Rejection { order_id, reason });
        }
        order.set_sequence(arrival);

        let result = self.guarded(&slot, order_id, |book, emitter| {
            self.execute(book, order, emitter)
        });

        tracing::debug!(
            symbol = %slot.symbol,
            order_id = %order_id,
            status = ?result.status(),
            trades = result.trades.len(),
            "order processed"
        );
        Ok(result)
    }

    /// Cancel a resting order by id. Cancelling twice yields `NotFound`.
    pub fn cancel(&self, order_id: OrderId) -> CancelResult {
        let slot = match self.route(order_id) {
            Some(slot) => slot,
            None => return CancelResult::NotFound,
        };

        let result = self.exclusive(&slot, |book, emitter| match book.cancel(order_id) {
            Some(order) => {
                self.routes.remove(&order_id);
                emitter.update(&order);
                CancelResult::Cancelled(order)
            },
            None => CancelResult::NotFound,
        });

        if result.is_cancelled() {
            tracing::debug!(symbol = %slot.symbol, order_id = %order_id, "order cancelled");
        }
        result
    }

    /// Change a resting order's price and/or remaining quantity.
    ///
    /// A pure decrease at the same price keeps time priority. A price change
    /// or an increase re-enters the order as a taker with a fresh arrival
    /// sequence; whatever does not trade rests at the back of its level.
    pub fn modify(&self, order_id: OrderId, request: ModifyRequest) -> ModifyResult {
        let slot = match self.route(order_id) {
            Some(slot) => slot,
            None => return ModifyResult::NotFound,
        };

        if let Err(reason) = validate_modify(&slot.config, &request) {
            tracing::warn!(order_id = %order_id, reason = %reason, "modify rejected");
            return ModifyResult::Rejected(reason);
        }

        self.guarded(&slot, order_id, |book, emitter| {
            let current = match book.get(order_id) {
                Some(order) => order.clone(),
                None => return ModifyResult::NotFound,
            };
            let price = request.price.or(current.price);
            let same_price = price == current.price;

            if same_price && request.quantity == current.remaining_quantity() {
                return ModifyResult::Modified(OrderResult {
                    order: current,
                    trades: Vec::new(),
                });
            }

            if same_price && request.quantity < current.remaining_quantity() {
                let order = book
                    .reduce_quantity(order_id, request.quantity)
                    .unwrap_or_else(|violation| invariant_violated(violation));
                emitter.update(&order);
                return ModifyResult::Modified(OrderResult {
                    order,
                    trades: Vec::new(),
                });
            }

            let mut order = match book.take(order_id) {
                Some(order) => order,
                None => invariant_violated(InvariantViolation::UnknownOrder(order_id)),
            };
            order.price = price;
            order.set_remaining_quantity(request.quantity);
            order.set_sequence(self.arrival_sequence.fetch_add(1, Ordering::AcqRel) + 1);

            ModifyResult::Modified(self.execute(book, order, emitter))
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Aggregated depth of one instrument, best levels first
    pub fn get_snapshot(&self, symbol: &str, depth: usize) -> Option<OrderBookSnapshot> {
        let slot = self.registry.lookup(symbol)?;
        let book = slot.book.lock();
        Some(book.snapshot(depth))
    }

    /// Current state of a resting order
    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        let slot = self.route(order_id)?;
        let book = slot.book.lock();
        book.get(order_id).cloned()
    }

    /// Top of book as (best bid, best ask)
    pub fn best_bid_ask(&self, symbol: &str) -> Option<(Option<Price>, Option<Price>)> {
        let slot = self.registry.lookup(symbol)?;
        let book = slot.book.lock();
        Some((book.best_bid(), book.best_ask()))
    }

    /// Registered symbols in registration order
    pub fn instruments(&self) -> Vec<String> {
        self.registry.symbols()
    }

    /// Number of registered instruments
    pub fn instrument_count(&self) -> usize {
        self.registry.len()
    }

    /// Name of the matching algorithm in use
    pub fn algorithm_name(&self) -> &str {
        self.algorithm.name()
    }

    // ========================================================================
    // Private methods
    // ========================================================================

    fn route(&self, order_id: OrderId) -> Option<Arc<BookSlot>> {
        let route = *self.routes.get(&order_id)?.value();
        self.registry.slot(route.slot)
    }

    /// Run `f` with the instrument's book held exclusively, then deliver the
    /// events it emitted.
    ///
    /// The dispatch lock is taken before the book lock is released, so the
    /// next operation on this book may match immediately but cannot deliver
    /// its events ahead of ours. It waits for our delivery with its book
    /// lock held, so a blocking sink stalls the instrument.
    fn exclusive<R>(
        &self,
        slot: &BookSlot,
        f: impl FnOnce(&mut OrderBook, &mut Emitter<'_>) -> R,
    ) -> R {
        let mut book = slot.book.lock();
        let mut emitter = Emitter::new(&self.event_sequence);
        let result = f(&mut *book, &mut emitter);
        debug_assert!(!book.is_crossed(), "book {} crossed at rest", slot.symbol);

        let _dispatch = slot.dispatch.lock();
        drop(book);
        self.deliver(emitter.events);
        result
    }

    /// [`exclusive`](Self::exclusive) for operations that hold a route for
    /// `order_id`. If the section unwinds, the route is released unless the
    /// order is still resting, so the id does not stay reserved forever.
    fn guarded<R>(
        &self,
        slot: &BookSlot,
        order_id: OrderId,
        f: impl FnOnce(&mut OrderBook, &mut Emitter<'_>) -> R,
    ) -> R {
        match catch_unwind(AssertUnwindSafe(|| self.exclusive(slot, f))) {
            Ok(result) => result,
            Err(payload) => {
                if !slot.book.lock().contains(order_id) {
                    self.routes.remove(&order_id);
                }
                tracing::error!(symbol = %slot.symbol, order_id = %order_id, "order operation aborted");
                resume_unwind(payload)
            },
        }
    }

    /// Match `order` as a taker and settle its remainder.
    ///
    /// Emits one trade and one maker update per fill, then exactly one
    /// update for the taker.
    fn execute(&self, book: &mut OrderBook, mut order: Order, emitter: &mut Emitter<'_>) -> OrderResult {
        if order.time_in_force == TimeInForce::FillOrKill {
            let wanted = order.remaining_quantity();
            if book.crossing_liquidity(order.side, order.price, wanted) < wanted {
                order
                    .cancel()
                    .unwrap_or_else(|violation| invariant_violated(violation));
                self.routes.remove(&order.id);
                emitter.update(&order);
                return OrderResult {
                    order,
                    trades: Vec::new(),
                };
            }
        }

        let fills = self
            .algorithm
            .match_order(&mut order, book)
            .unwrap_or_else(|violation| invariant_violated(violation));

        let mut trades = Vec::with_capacity(fills.len());
        for fill in fills {
            trades.push(emitter.trade(&order, fill.maker.id, fill.price, fill.quantity));
            emitter.update(&fill.maker);
            if fill.maker.status() == OrderStatus::Filled {
                self.routes.remove(&fill.maker.id);
            }
        }

        if order.remaining_quantity() > Decimal::ZERO {
            let rests = order.order_type == OrderType::Limit
                && order.time_in_force == TimeInForce::GoodTillCancel;
            if rests {
                book.insert(order.clone())
                    .unwrap_or_else(|violation| invariant_violated(violation));
            } else {
                order
                    .cancel()
                    .unwrap_or_else(|violation| invariant_violated(violation));
            }
        }

        if order.status().is_terminal() {
            self.routes.remove(&order.id);
        }
        emitter.update(&order);

        OrderResult { order, trades }
    }

    fn reject(&self, slot: Option<&BookSlot>, mut order: Order, reason: RejectReason) -> Rejection {
        tracing::warn!(
            symbol = %order.symbol,
            order_id = %order.id,
            code = reason.code(),
            reason = %reason,
            "order rejected"
        );
        order
            .reject()
            .unwrap_or_else(|violation| invariant_violated(violation));

        let rejection = Rejection {
            order_id: order.id,
            reason: reason.clone(),
        };
        match slot {
            Some(slot) => self.exclusive(slot, |_, emitter| emitter.rejected(&order, reason)),
            None => {
                let mut emitter = Emitter::new(&self.event_sequence);
                emitter.rejected(&order, reason);
                self.deliver(emitter.events);
            },
        }
        rejection
    }

    fn deliver(&self, events: Vec<EngineEvent>) {
        for event in events {
            let (kind, sequence, outcome) = match event {
                EngineEvent::Trade(trade) => {
                    let sequence = trade.sequence;
                    let sink = &self.trade_sink;
                    ("trade", sequence, catch_unwind(AssertUnwindSafe(|| sink.on_trade(trade))))
                },
                EngineEvent::Update(update) => {
                    let sequence = update.sequence;
                    let sink = &self.order_sink;
                    (
                        "order update",
                        sequence,
                        catch_unwind(AssertUnwindSafe(|| sink.on_order_update(update))),
                    )
                },
            };
            if outcome.is_err() {
                tracing::error!(kind, sequence, "event sink panicked; event dropped");
            }
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_intent(config: &InstrumentConfig, intent: &OrderIntent) -> Result<(), RejectReason> {
    if intent.quantity <= Decimal::ZERO {
        return Err(RejectReason::NonPositiveQuantity);
    }

    match (intent.order_type, intent.price) {
        (OrderType::Limit, None) => return Err(RejectReason::MissingLimitPrice),
        (OrderType::Limit, Some(price)) if price <= Decimal::ZERO => {
            return Err(RejectReason::NonPositivePrice)
        },
        (OrderType::Limit, Some(price)) => config.check_price(price)?,
        (OrderType::Market, Some(_)) => return Err(RejectReason::MarketOrderWithPrice),
        (OrderType::Market, None) => {},
    }

    config.check_quantity(intent.quantity)
}

fn validate_modify(config: &InstrumentConfig, request: &ModifyRequest) -> Result<(), RejectReason> {
    if request.quantity <= Decimal::ZERO {
        return Err(RejectReason::NonPositiveQuantity);
    }
    if let Some(price) = request.price {
        if price <= Decimal::ZERO {
            return Err(RejectReason::NonPositivePrice);
        }
        config.check_price(price)?;
    }
    config.check_quantity(request.quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, MAX_ORDER_QUANTITY};
    use crate::engine::PriceTimePriority;
    use crate::interfaces::MemorySink;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn engine_with_sink() -> (MatchingEngine, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let engine = MatchingEngine::new(
            Box::new(PriceTimePriority::new()),
            sink.clone(),
            sink.clone(),
        );
        engine.add_instrument(InstrumentConfig::new("BTC-USD")).unwrap();
        engine.add_instrument(InstrumentConfig::new("ETH-USD")).unwrap();
        (engine, sink)
    }

    fn limit(side: Side, price: i64, quantity: i64) -> OrderIntent {
        OrderIntent::limit("BTC-USD", side, Decimal::from(price), Decimal::from(quantity))
    }

    fn statuses(sink: &MemorySink, order_id: OrderId) -> Vec<OrderStatus> {
        sink.order_updates()
            .iter()
            .filter(|update| update.order_id == order_id)
            .map(|update| update.status)
            .collect()
    }

    #[test]
    fn test_partial_fill_of_resting_buy() {
        let (engine, sink) = engine_with_sink();

        let buy = engine.submit(limit(Side::Buy, 100, 10)).unwrap();
        assert_eq!(buy.status(), OrderStatus::New);

        let sell = engine.submit(limit(Side::Sell, 100, 5)).unwrap();
        assert_eq!(sell.trades.len(), 1);
        assert_eq!(sell.trades[0].price, Decimal::from(100));
        assert_eq!(sell.trades[0].quantity, Decimal::from(5));
        assert_eq!(sell.trades[0].maker_order_id, buy.order.id);
        assert_eq!(sell.trades[0].taker_side, Side::Sell);
        assert_eq!(sell.status(), OrderStatus::Filled);

        let resting = engine.order(buy.order.id).unwrap();
        assert_eq!(resting.status(), OrderStatus::PartiallyFilled);
        assert_eq!(resting.remaining_quantity(), Decimal::from(5));

        assert_eq!(
            statuses(&sink, buy.order.id),
            vec![OrderStatus::New, OrderStatus::PartiallyFilled]
        );
        assert_eq!(statuses(&sink, sell.order.id), vec![OrderStatus::Filled]);
    }

    #[test]
    fn test_non_crossing_orders_rest() {
        let (engine, sink) = engine_with_sink();

        engine.submit(limit(Side::Sell, 101, 10)).unwrap();
        engine.submit(limit(Side::Buy, 99, 10)).unwrap();

        assert!(sink.trades().is_empty());
        assert_eq!(
            engine.best_bid_ask("BTC-USD"),
            Some((Some(Decimal::from(99)), Some(Decimal::from(101))))
        );
    }

    #[test]
    fn test_market_order_on_empty_book_is_cancelled() {
        let (engine, sink) = engine_with_sink();

        let result = engine
            .submit(OrderIntent::market("BTC-USD", Side::Buy, Decimal::from(10)))
            .unwrap();

        assert_eq!(result.status(), OrderStatus::Cancelled);
        assert_eq!(result.order.filled_quantity(), Decimal::ZERO);
        assert!(result.trades.is_empty());
        assert!(sink.trades().is_empty());
        assert_eq!(statuses(&sink, result.order.id), vec![OrderStatus::Cancelled]);
        assert!(engine.order(result.order.id).is_none());
    }

    #[test]
    fn test_price_priority_then_time_priority() {
        let (engine, _sink) = engine_with_sink();

        let late_better = engine.submit(limit(Side::Sell, 100, 1)).unwrap();
        let first_at_101 = engine.submit(limit(Side::Sell, 101, 1)).unwrap();
        let second_at_101 = engine.submit(limit(Side::Sell, 101, 1)).unwrap();

        let buy = engine.submit(limit(Side::Buy, 101, 3)).unwrap();
        let makers: Vec<OrderId> = buy.trades.iter().map(|t| t.maker_order_id).collect();
        assert_eq!(
            makers,
            vec![late_better.order.id, first_at_101.order.id, second_at_101.order.id]
        );
        let prices: Vec<Decimal> = buy.trades.iter().map(|t| t.price).collect();
        assert_eq!(
            prices,
            vec![Decimal::from(100), Decimal::from(101), Decimal::from(101)]
        );
    }

    #[test]
    fn test_event_order_trade_then_maker_then_taker() {
        let (engine, sink) = engine_with_sink();
        let maker = engine.submit(limit(Side::Sell, 100, 2)).unwrap();
        sink.take();

        let taker = engine.submit(limit(Side::Buy, 100, 5)).unwrap();
        let (updates, trades) = sink.take();

        assert_eq!(trades.len(), 1);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].order_id, maker.order.id);
        assert_eq!(updates[0].status, OrderStatus::Filled);
        assert_eq!(updates[1].order_id, taker.order.id);
        assert_eq!(updates[1].status, OrderStatus::PartiallyFilled);
        assert!(trades[0].sequence < updates[0].sequence);
        assert!(updates[0].sequence < updates[1].sequence);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (engine, sink) = engine_with_sink();
        let order = engine.submit(limit(Side::Buy, 100, 10)).unwrap().order;

        let cancelled = engine.cancel(order.id);
        match cancelled {
            CancelResult::Cancelled(order) => {
                assert_eq!(order.status(), OrderStatus::Cancelled);
                assert_eq!(order.remaining_quantity(), Decimal::from(10));
            },
            CancelResult::NotFound => panic!("resting order should cancel"),
        }
        assert!(matches!(engine.cancel(order.id), CancelResult::NotFound));
        assert!(matches!(engine.cancel(OrderId::new()), CancelResult::NotFound));

        assert_eq!(
            statuses(&sink, order.id),
            vec![OrderStatus::New, OrderStatus::Cancelled]
        );
        assert_eq!(engine.best_bid_ask("BTC-USD"), Some((None, None)));
    }

    #[test]
    fn test_cancel_filled_order_not_found() {
        let (engine, _sink) = engine_with_sink();
        let maker = engine.submit(limit(Side::Sell, 100, 1)).unwrap().order;
        engine.submit(limit(Side::Buy, 100, 1)).unwrap();

        assert!(matches!(engine.cancel(maker.id), CancelResult::NotFound));
    }

    #[test]
    fn test_validation_rejections() {
        let (engine, sink) = engine_with_sink();

        let cases = vec![
            (limit(Side::Buy, 100, 0), RejectReason::NonPositiveQuantity),
            (limit(Side::Buy, 0, 1), RejectReason::NonPositivePrice),
            (
                OrderIntent {
                    price: None,
                    ..limit(Side::Buy, 100, 1)
                },
                RejectReason::MissingLimitPrice,
            ),
            (
                OrderIntent {
                    price: Some(Decimal::from(100)),
                    ..OrderIntent::market("BTC-USD", Side::Buy, Decimal::ONE)
                },
                RejectReason::MarketOrderWithPrice,
            ),
            (
                OrderIntent::limit("DOGE-USD", Side::Buy, Decimal::ONE, Decimal::ONE),
                RejectReason::UnknownSymbol("DOGE-USD".to_string()),
            ),
        ];

        for (intent, expected) in cases {
            let rejection = engine.submit(intent).unwrap_err();
            assert_eq!(rejection.reason, expected);
            let updates = sink.order_updates();
            let last = updates.last().unwrap();
            assert_eq!(last.order_id, rejection.order_id);
            assert_eq!(last.status, OrderStatus::Rejected);
            assert_eq!(last.reject_reason, Some(expected));
        }

        assert!(sink.trades().is_empty());
        assert_eq!(engine.best_bid_ask("BTC-USD"), Some((None, None)));
    }

    #[test]
    fn test_instrument_rules_enforced() {
        let (engine, _sink) = engine_with_sink();
        engine
            .add_instrument(InstrumentConfig::equity("AAPL").with_max_quantity(Decimal::from(500)))
            .unwrap();

        let off_tick = OrderIntent::limit("AAPL", Side::Buy, Decimal::new(150005, 3), Decimal::ONE);
        assert!(matches!(
            engine.submit(off_tick).unwrap_err().reason,
            RejectReason::TickSizeViolation { .. }
        ));

        let odd_lot = OrderIntent::limit("AAPL", Side::Buy, Decimal::from(150), Decimal::new(5, 1));
        assert!(matches!(
            engine.submit(odd_lot).unwrap_err().reason,
            RejectReason::LotSizeViolation { .. }
        ));

        let too_big = OrderIntent::limit("AAPL", Side::Buy, Decimal::from(150), Decimal::from(501));
        assert!(matches!(
            engine.submit(too_big).unwrap_err().reason,
            RejectReason::QuantityAboveMaximum { .. }
        ));
    }

    #[test]
    fn test_duplicate_live_order_id_rejected() {
        let (engine, sink) = engine_with_sink();
        let id = OrderId::new();

        engine.submit(limit(Side::Buy, 100, 1).with_order_id(id)).unwrap();

        // Live in another book too
        let other = OrderIntent::limit("ETH-USD", Side::Buy, Decimal::ONE, Decimal::ONE)
            .with_order_id(id);
        assert_eq!(
            engine.submit(other).unwrap_err().reason,
            RejectReason::DuplicateOrderId(id)
        );

        // The live order's update stream is untouched by the refusal
        engine.cancel(id);
        assert_eq!(
            statuses(&sink, id),
            vec![OrderStatus::New, OrderStatus::Cancelled]
        );

        // Once terminal the id is free again
        assert!(engine.submit(limit(Side::Buy, 100, 1).with_order_id(id)).is_ok());
    }

    #[test]
    fn test_oversized_quantity_rejected_before_book() {
        let (engine, sink) = engine_with_sink();
        let id = OrderId::new();

        engine
            .submit(OrderIntent::limit("BTC-USD", Side::Sell, Decimal::from(100), MAX_ORDER_QUANTITY))
            .unwrap();
        let oversized = OrderIntent::limit("BTC-USD", Side::Sell, Decimal::from(100), Decimal::MAX)
            .with_order_id(id);
        assert_eq!(
            engine.submit(oversized).unwrap_err().reason,
            RejectReason::QuantityAboveMaximum {
                quantity: Decimal::MAX,
                maximum: MAX_ORDER_QUANTITY,
            }
        );
        assert_eq!(statuses(&sink, id), vec![OrderStatus::Rejected]);

        // The id was never reserved
        let retry = engine
            .submit(limit(Side::Sell, 50, 1).with_order_id(id))
            .unwrap();
        assert_eq!(retry.status(), OrderStatus::New);
        assert_eq!(
            engine.get_snapshot("BTC-USD", 5).unwrap().asks,
            vec![
                (Decimal::from(50), Decimal::ONE),
                (Decimal::from(100), MAX_ORDER_QUANTITY),
            ]
        );
    }

    #[test]
    fn test_immediate_or_cancel_remainder_cancelled() {
        let (engine, sink) = engine_with_sink();
        engine.submit(limit(Side::Sell, 100, 3)).unwrap();

        let ioc = engine
            .submit(limit(Side::Buy, 100, 5).with_time_in_force(TimeInForce::ImmediateOrCancel))
            .unwrap();

        assert_eq!(ioc.status(), OrderStatus::Cancelled);
        assert_eq!(ioc.filled_quantity(), Decimal::from(3));
        assert_eq!(ioc.order.remaining_quantity(), Decimal::from(2));
        assert_eq!(statuses(&sink, ioc.order.id), vec![OrderStatus::Cancelled]);
        assert_eq!(engine.best_bid_ask("BTC-USD"), Some((None, None)));
    }

    #[test]
    fn test_fill_or_kill() {
        let (engine, sink) = engine_with_sink();
        engine.submit(limit(Side::Sell, 100, 3)).unwrap();
        engine.submit(limit(Side::Sell, 102, 3)).unwrap();

        // Only 3 available at or below 101
        let killed = engine
            .submit(limit(Side::Buy, 101, 5).with_time_in_force(TimeInForce::FillOrKill))
            .unwrap();
        assert_eq!(killed.status(), OrderStatus::Cancelled);
        assert!(killed.trades.is_empty());
        assert!(sink.trades().is_empty());

        let filled = engine
            .submit(limit(Side::Buy, 102, 5).with_time_in_force(TimeInForce::FillOrKill))
            .unwrap();
        assert_eq!(filled.status(), OrderStatus::Filled);
        assert_eq!(filled.trades.len(), 2);

        let snapshot = engine.get_snapshot("BTC-USD", 5).unwrap();
        assert_eq!(snapshot.asks, vec![(Decimal::from(102), Decimal::ONE)]);
    }

    #[test]
    fn test_modify_decrease_keeps_priority() {
        let (engine, sink) = engine_with_sink();
        let first = engine.submit(limit(Side::Sell, 100, 5)).unwrap().order;
        let second = engine.submit(limit(Side::Sell, 100, 5)).unwrap().order;
        sink.take();

        let result = engine.modify(first.id, ModifyRequest::quantity(Decimal::from(2)));
        match &result {
            ModifyResult::Modified(result) => {
                assert_eq!(result.order.remaining_quantity(), Decimal::from(2));
                assert_eq!(result.status(), OrderStatus::New);
            },
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(statuses(&sink, first.id), vec![OrderStatus::New]);

        let buy = engine.submit(limit(Side::Buy, 100, 2)).unwrap();
        assert_eq!(buy.trades[0].maker_order_id, first.id);
        assert!(engine.order(second.id).is_some());
    }

    #[test]
    fn test_modify_increase_loses_priority() {
        let (engine, _sink) = engine_with_sink();
        let first = engine.submit(limit(Side::Sell, 100, 1)).unwrap().order;
        let second = engine.submit(limit(Side::Sell, 100, 1)).unwrap().order;

        assert!(engine
            .modify(first.id, ModifyRequest::quantity(Decimal::from(2)))
            .is_modified());

        let buy = engine.submit(limit(Side::Buy, 100, 1)).unwrap();
        assert_eq!(buy.trades[0].maker_order_id, second.id);
        assert_eq!(
            engine.order(first.id).map(|order| order.remaining_quantity()),
            Some(Decimal::from(2))
        );
    }

    #[test]
    fn test_modify_price_can_cross() {
        let (engine, sink) = engine_with_sink();
        let ask = engine.submit(limit(Side::Sell, 101, 4)).unwrap().order;
        let bid = engine.submit(limit(Side::Buy, 99, 3)).unwrap().order;
        sink.take();

        let result = engine.modify(
            bid.id,
            ModifyRequest::price_and_quantity(Decimal::from(101), Decimal::from(3)),
        );
        let result = match result {
            ModifyResult::Modified(result) => result,
            other => panic!("unexpected {:?}", other),
        };

        assert_eq!(result.status(), OrderStatus::Filled);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].price, Decimal::from(101));
        assert_eq!(
            engine.order(ask.id).map(|order| order.remaining_quantity()),
            Some(Decimal::ONE)
        );

        let (updates, trades) = sink.take();
        assert_eq!(trades.len(), 1);
        assert_eq!(updates.last().map(|u| u.order_id), Some(bid.id));
    }

    #[test]
    fn test_modify_not_found_rejected_and_noop() {
        let (engine, sink) = engine_with_sink();
        let order = engine.submit(limit(Side::Buy, 100, 5)).unwrap().order;
        sink.take();

        assert!(matches!(
            engine.modify(OrderId::new(), ModifyRequest::quantity(Decimal::ONE)),
            ModifyResult::NotFound
        ));
        assert!(matches!(
            engine.modify(order.id, ModifyRequest::quantity(Decimal::ZERO)),
            ModifyResult::Rejected(RejectReason::NonPositiveQuantity)
        ));
        assert!(engine
            .modify(order.id, ModifyRequest::quantity(Decimal::from(5)))
            .is_modified());

        let (updates, trades) = sink.take();
        assert!(updates.is_empty());
        assert!(trades.is_empty());
    }

    #[test]
    fn test_snapshot_and_queries() {
        let (engine, _sink) = engine_with_sink();
        for i in 0..5 {
            engine.submit(limit(Side::Buy, 50000 - i * 100, 1)).unwrap();
            engine.submit(limit(Side::Sell, 50100 + i * 100, 1)).unwrap();
        }

        let snapshot = engine.get_snapshot("BTC-USD", 3).unwrap();
        assert_eq!(snapshot.bids.len(), 3);
        assert_eq!(snapshot.asks.len(), 3);
        assert_eq!(snapshot.best_bid(), Some(Decimal::from(50000)));
        assert_eq!(snapshot.spread, Some(Decimal::from(100)));

        assert!(engine.get_snapshot("DOGE-USD", 3).is_none());
        assert_eq!(engine.instruments(), vec!["BTC-USD", "ETH-USD"]);
        assert_eq!(engine.instrument_count(), 2);
        assert_eq!(engine.algorithm_name(), "PriceTime");
    }

    struct PanickingSink;

    impl OrderUpdateSink for PanickingSink {
        fn on_order_update(&self, _update: OrderUpdate) {
            panic!("consumer failure");
        }
    }

    #[test]
    fn test_sink_panic_does_not_reach_caller() {
        let trades = Arc::new(MemorySink::new());
        let engine = MatchingEngine::new(
            Box::new(PriceTimePriority::new()),
            Arc::new(PanickingSink),
            trades.clone(),
        );
        engine.add_instrument(InstrumentConfig::new("BTC-USD")).unwrap();

        engine.submit(limit(Side::Sell, 100, 1)).unwrap();
        let result = engine.submit(limit(Side::Buy, 100, 1)).unwrap();

        assert_eq!(result.status(), OrderStatus::Filled);
        assert_eq!(trades.trades().len(), 1);
    }

    /// Aborts its first match, then behaves like price-time
    #[derive(Default)]
    struct AbortOnce {
        aborted: std::sync::atomic::AtomicBool,
    }

    impl MatchingAlgorithm for AbortOnce {
        fn match_order(
            &self,
            incoming: &mut Order,
            book: &mut OrderBook,
        ) -> Result<crate::interfaces::Fills, InvariantViolation> {
            if !self.aborted.swap(true, Ordering::AcqRel) {
                invariant_violated(InvariantViolation::UnknownOrder(incoming.id));
            }
            PriceTimePriority::new().match_order(incoming, book)
        }

        fn name(&self) -> &str {
            "AbortOnce"
        }
    }

    #[test]
    fn test_aborted_submit_releases_order_id() {
        let sink = Arc::new(MemorySink::new());
        let engine = MatchingEngine::new(Box::new(AbortOnce::default()), sink.clone(), sink.clone());
        engine.add_instrument(InstrumentConfig::new("BTC-USD")).unwrap();
        let id = OrderId::new();

        let aborted = catch_unwind(AssertUnwindSafe(|| {
            engine.submit(limit(Side::Buy, 100, 1).with_order_id(id))
        }));
        assert!(aborted.is_err());
        assert!(engine.order(id).is_none());
        assert!(statuses(&sink, id).is_empty());

        let retry = engine.submit(limit(Side::Buy, 100, 1).with_order_id(id)).unwrap();
        assert_eq!(retry.status(), OrderStatus::New);
        assert_eq!(engine.order(id).map(|o| o.id), Some(id));
    }

    // ========================================================================
    // Properties
    // ========================================================================

    #[derive(Debug, Clone)]
    enum Op {
        Limit { buy: bool, price: i64, quantity: i64 },
        Market { buy: bool, quantity: i64 },
        Cancel { nth: usize },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            6 => (any::<bool>(), 95i64..=105, 1i64..=20)
                .prop_map(|(buy, price, quantity)| Op::Limit { buy, price, quantity }),
            1 => (any::<bool>(), 1i64..=30).prop_map(|(buy, quantity)| Op::Market { buy, quantity }),
            2 => any::<usize>().prop_map(|nth| Op::Cancel { nth }),
        ]
    }

    fn side(buy: bool) -> Side {
        if buy {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    proptest! {
        #[test]
        fn prop_book_state_matches_event_log(ops in prop::collection::vec(op_strategy(), 1..80)) {
            let (engine, sink) = engine_with_sink();
            let mut submitted: Vec<OrderId> = Vec::new();
            let mut submitted_quantity = HashMap::new();

            for op in ops {
                match op {
                    Op::Limit { buy, price, quantity } => {
                        let result = engine.submit(limit(side(buy), price, quantity)).unwrap();
                        prop_assert_eq!(
                            result.order.quantity,
                            result.order.filled_quantity() + result.order.remaining_quantity()
                        );
                        prop_assert_eq!(result.filled_quantity(), result.order.filled_quantity());
                        submitted_quantity.insert(result.order.id, Decimal::from(quantity));
                        submitted.push(result.order.id);
                    },
                    Op::Market { buy, quantity } => {
                        let result = engine
                            .submit(OrderIntent::market("BTC-USD", side(buy), Decimal::from(quantity)))
                            .unwrap();
                        prop_assert!(result.status().is_terminal());
                        submitted_quantity.insert(result.order.id, Decimal::from(quantity));
                    },
                    Op::Cancel { nth } => {
                        if !submitted.is_empty() {
                            let id = submitted[nth % submitted.len()];
                            engine.cancel(id);
                        }
                    },
                }

                let (bid, ask) = engine.best_bid_ask("BTC-USD").unwrap();
                if let (Some(bid), Some(ask)) = (bid, ask) {
                    prop_assert!(bid < ask);
                }
            }

            // Last update per order, replayed in sequence order
            let updates = sink.order_updates();
            let mut last: HashMap<OrderId, OrderUpdate> = HashMap::new();
            let mut previous_sequence = 0;
            for update in updates {
                prop_assert!(update.sequence > previous_sequence);
                previous_sequence = update.sequence;
                last.insert(update.order_id, update);
            }

            // Every accepted order produced at least one update
            for id in submitted_quantity.keys() {
                prop_assert!(last.contains_key(id));
            }

            // Resting quantity in the book equals what the event log says rests
            let snapshot = engine.get_snapshot("BTC-USD", usize::MAX).unwrap();
            let book_total = snapshot.total_bid_quantity() + snapshot.total_ask_quantity();
            let log_total: Decimal = last
                .values()
                .filter(|update| !update.is_terminal())
                .map(|update| update.remaining_quantity)
                .sum();
            prop_assert_eq!(book_total, log_total);

            // Each unit traded is counted once on each side
            let traded: Decimal = sink.trades().iter().map(|trade| trade.quantity).sum();
            let filled: Decimal = last.values().map(|update| update.filled_quantity).sum();
            prop_assert_eq!(filled, traded * Decimal::from(2));

            // Nothing was created or lost
            for (id, quantity) in &submitted_quantity {
                let update = &last[id];
                prop_assert_eq!(update.filled_quantity + update.remaining_quantity, *quantity);
            }
        }

        #[test]
        fn prop_cancel_twice_not_found(price in 90i64..110, quantity in 1i64..50) {
            let (engine, _sink) = engine_with_sink();
            let order = engine.submit(limit(Side::Buy, price, quantity)).unwrap().order;

            prop_assert!(engine.cancel(order.id).is_cancelled());
            prop_assert!(!engine.cancel(order.id).is_cancelled());
        }
    }
}
