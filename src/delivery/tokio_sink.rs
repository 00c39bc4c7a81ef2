// ============================================================================
// Tokio Sink
// Forwards events into an async consumer through a bounded mpsc channel
// ============================================================================

use crate::domain::{OrderUpdate, Trade};
use crate::interfaces::{OrderUpdateSink, TradeSink};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Never awaits: a full or closed channel drops the event and counts it.
pub struct TokioSink<T> {
    sender: mpsc::Sender<T>,
    dropped: AtomicU64,
}

impl<T: Send + 'static> TokioSink<T> {
    /// Create the sink and the receiver an async task should drain
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward(&self, event: T) {
        match self.sender.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("async delivery channel full, event dropped");
            },
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            },
        }
    }
}

impl OrderUpdateSink for TokioSink<OrderUpdate> {
    fn on_order_update(&self, update: OrderUpdate) {
        self.forward(update);
    }
}

impl TradeSink for TokioSink<Trade> {
    fn on_trade(&self, trade: Trade) {
        self.forward(trade);
    }
}
