// ============================================================================
// Channel Sink
// Bounded queue plus a dedicated consumer thread per sink
// ============================================================================

use crate::domain::{ConfigError, DeliveryConfig, OrderUpdate, OverflowPolicy, Trade};
use crate::interfaces::{OrderUpdateSink, TradeSink};
use crossbeam::channel::{self, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    consumer_failures: AtomicU64,
}

/// Point-in-time delivery counters of one sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub consumer_failures: u64,
    /// Events waiting in the queue
    pub queued: usize,
}

/// Decouples the engine from a slow consumer.
///
/// The engine's call returns as soon as the event is queued; a named worker
/// thread feeds the consumer in queue order. A full queue either drops the
/// event or makes the producer wait, per [`OverflowPolicy`].
pub struct ChannelSink<T: Send + 'static> {
    name: String,
    policy: OverflowPolicy,
    sender: RwLock<Option<Sender<T>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl<T: Send + 'static> ChannelSink<T> {
    /// Start the worker thread `name` feeding `consumer`.
    pub fn spawn<F>(
        name: impl Into<String>,
        config: DeliveryConfig,
        mut consumer: F,
    ) -> Result<Self, ConfigError>
    where
        F: FnMut(T) + Send + 'static,
    {
        config.validate()?;

        let name = name.into();
        let (sender, receiver) = channel::bounded::<T>(config.capacity);
        let counters = Arc::new(Counters::default());

        let worker_counters = Arc::clone(&counters);
        let worker_name = name.clone();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for event in receiver {
                    match catch_unwind(AssertUnwindSafe(|| consumer(event))) {
                        Ok(()) => {
                            worker_counters.delivered.fetch_add(1, Ordering::Relaxed);
                        },
                        Err(_) => {
                            worker_counters
                                .consumer_failures
                                .fetch_add(1, Ordering::Relaxed);
                            tracing::error!(sink = %worker_name, "event consumer panicked");
                        },
                    }
                }
                tracing::debug!(sink = %worker_name, "delivery worker stopped");
            })
            .map_err(|e| ConfigError::Spawn(e.to_string()))?;

        tracing::info!(
            sink = %name,
            capacity = config.capacity,
            policy = ?config.overflow_policy,
            "delivery worker started"
        );

        Ok(Self {
            name,
            policy: config.overflow_policy,
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            counters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> DeliveryStats {
        let queued = self.sender.read().as_ref().map_or(0, Sender::len);
        DeliveryStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            consumer_failures: self.counters.consumer_failures.load(Ordering::Relaxed),
            queued,
        }
    }

    /// Stop accepting events, drain the queue, and join the worker.
    pub fn close(&self) {
        self.sender.write().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!(sink = %self.name, "delivery worker panicked");
            }
        }
    }

    fn enqueue(&self, event: T) {
        let guard = self.sender.read();
        let sender = match guard.as_ref() {
            Some(sender) => sender,
            None => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            },
        };

        let sent = match self.policy {
            OverflowPolicy::DropNewest => match sender.try_send(event) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(sink = %self.name, "delivery queue full, event dropped");
                    false
                },
                Err(TrySendError::Disconnected(_)) => false,
            },
            OverflowPolicy::Block => sender.send(event).is_ok(),
        };

        let counter = if sent {
            &self.counters.enqueued
        } else {
            &self.counters.dropped
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl<T: Send + 'static> Drop for ChannelSink<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl OrderUpdateSink for ChannelSink<OrderUpdate> {
    fn on_order_update(&self, update: OrderUpdate) {
        self.enqueue(update);
    }
}

impl TradeSink for ChannelSink<Trade> {
    fn on_trade(&self, trade: Trade) {
        self.enqueue(trade);
    }
}
