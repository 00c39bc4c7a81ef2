// ============================================================================
// Event Sink Interfaces
// Outbound contracts for order updates and trades
// ============================================================================

use crate::domain::{OrderUpdate, Trade};
use parking_lot::Mutex;

/// Receives order status transitions.
///
/// Called outside the book lock, in emission order per instrument.
/// Implementations must return quickly and never block on I/O; hand slow
/// work to a queue (see [`crate::delivery::ChannelSink`]).
pub trait OrderUpdateSink: Send + Sync {
    fn on_order_update(&self, update: OrderUpdate);

    /// Batch delivery (optional optimization)
    fn on_order_updates(&self, updates: Vec<OrderUpdate>) {
        for update in updates {
            self.on_order_update(update);
        }
    }
}

/// Receives executed trades. Same delivery contract as [`OrderUpdateSink`].
pub trait TradeSink: Send + Sync {
    fn on_trade(&self, trade: Trade);
}

/// No-op sink for callers that only use synchronous results
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl OrderUpdateSink for NoOpSink {
    fn on_order_update(&self, _update: OrderUpdate) {}
}

impl TradeSink for NoOpSink {
    fn on_trade(&self, _trade: Trade) {}
}

/// Logging sink
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl OrderUpdateSink for LoggingSink {
    fn on_order_update(&self, update: OrderUpdate) {
        tracing::debug!(
            order_id = %update.order_id,
            symbol = %update.symbol,
            status = ?update.status,
            remaining = %update.remaining_quantity,
            sequence = update.sequence,
            "order update"
        );
    }
}

impl TradeSink for LoggingSink {
    fn on_trade(&self, trade: Trade) {
        tracing::debug!(
            symbol = %trade.symbol,
            price = %trade.price,
            quantity = %trade.quantity,
            maker = %trade.maker_order_id,
            taker = %trade.taker_order_id,
            sequence = trade.sequence,
            "trade"
        );
    }
}

/// In-memory audit log of everything delivered.
#[derive(Debug, Default)]
pub struct MemorySink {
    updates: Mutex<Vec<OrderUpdate>>,
    trades: Mutex<Vec<Trade>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_updates(&self) -> Vec<OrderUpdate> {
        self.updates.lock().clone()
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.trades.lock().clone()
    }

    /// Drain both logs
    pub fn take(&self) -> (Vec<OrderUpdate>, Vec<Trade>) {
        let updates = std::mem::take(&mut *self.updates.lock());
        let trades = std::mem::take(&mut *self.trades.lock());
        (updates, trades)
    }
}

impl OrderUpdateSink for MemorySink {
    fn on_order_update(&self, update: OrderUpdate) {
        self.updates.lock().push(update);
    }

    fn on_order_updates(&self, updates: Vec<OrderUpdate>) {
        self.updates.lock().extend(updates);
    }
}

impl TradeSink for MemorySink {
    fn on_trade(&self, trade: Trade) {
        self.trades.lock().push(trade);
    }
}
