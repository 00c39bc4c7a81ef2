// ============================================================================
// Matching Engine Factory
// Creates matching engines with proper configuration
// ============================================================================

use crate::delivery::ChannelSink;
use crate::domain::{ConfigError, EngineConfig, InstrumentConfig, OrderUpdate, Trade};
use crate::engine::{MatchingEngine, PriceTimePriority};
use crate::interfaces::{MatchingAlgorithm, NoOpSink, OrderUpdateSink, TradeSink};
use std::sync::Arc;

// ============================================================================
// Factory Functions
// ============================================================================

/// Creates a matching engine from configuration
///
/// # Arguments
/// * `config` - Instruments to register (delivery settings are not used here)
/// * `order_sink` - Receives order updates
/// * `trade_sink` - Receives trades
///
/// # Example
/// ```
/// use price_time_matching::prelude::*;
/// use std::sync::Arc;
///
/// let config = EngineConfig::new().with_instrument(InstrumentConfig::equity("AAPL"));
/// let engine = create_from_config(config, Arc::new(NoOpSink), Arc::new(NoOpSink)).unwrap();
/// assert_eq!(engine.instruments(), vec!["AAPL"]);
/// ```
pub fn create_from_config(
    config: EngineConfig,
    order_sink: Arc<dyn OrderUpdateSink>,
    trade_sink: Arc<dyn TradeSink>,
) -> Result<MatchingEngine, ConfigError> {
    config.validate()?;

    let engine = MatchingEngine::new(Box::new(PriceTimePriority::new()), order_sink, trade_sink);
    for instrument in config.instruments {
        engine.add_instrument(instrument)?;
    }
    Ok(engine)
}

/// Engine whose sinks are channel-backed, per `config.delivery`.
///
/// Each consumer runs on its own worker thread. The returned sinks expose
/// delivery statistics and shut their worker down on `close` or drop.
pub fn create_with_channels<U, T>(
    config: EngineConfig,
    on_order_update: U,
    on_trade: T,
) -> Result<
    (
        MatchingEngine,
        Arc<ChannelSink<OrderUpdate>>,
        Arc<ChannelSink<Trade>>,
    ),
    ConfigError,
>
where
    U: FnMut(OrderUpdate) + Send + 'static,
    T: FnMut(Trade) + Send + 'static,
{
    config.validate()?;

    let updates = Arc::new(ChannelSink::spawn(
        "order-updates",
        config.delivery,
        on_order_update,
    )?);
    let trades = Arc::new(ChannelSink::spawn("trades", config.delivery, on_trade)?);

    let engine = create_from_config(config, updates.clone(), trades.clone())?;
    Ok((engine, updates, trades))
}

// ============================================================================
// Builder Pattern for Advanced Configuration
// ============================================================================

/// Builder for creating matching engines with fluent API
///
/// # Example
/// ```
/// use price_time_matching::prelude::*;
/// use rust_decimal::Decimal;
/// use std::sync::Arc;
///
/// let sink = Arc::new(MemorySink::new());
/// let engine = MatchingEngineBuilder::new()
///     .instrument(InstrumentConfig::new("BTC-USD").with_tick_size(Decimal::new(1, 2)))
///     .order_update_sink(sink.clone())
///     .trade_sink(sink)
///     .build()
///     .unwrap();
/// ```
#[derive(Default)]
pub struct MatchingEngineBuilder {
    instruments: Vec<InstrumentConfig>,
    order_sink: Option<Arc<dyn OrderUpdateSink>>,
    trade_sink: Option<Arc<dyn TradeSink>>,
    algorithm: Option<Box<dyn MatchingAlgorithm>>,
}

impl MatchingEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Instruments
    // ========================================================================

    pub fn instrument(mut self, config: InstrumentConfig) -> Self {
        self.instruments.push(config);
        self
    }

    pub fn instruments(mut self, configs: impl IntoIterator<Item = InstrumentConfig>) -> Self {
        self.instruments.extend(configs);
        self
    }

    // ========================================================================
    // Collaborators
    // ========================================================================

    pub fn order_update_sink(mut self, sink: Arc<dyn OrderUpdateSink>) -> Self {
        self.order_sink = Some(sink);
        self
    }

    pub fn trade_sink(mut self, sink: Arc<dyn TradeSink>) -> Self {
        self.trade_sink = Some(sink);
        self
    }

    /// Replace the default price/time algorithm
    pub fn algorithm(mut self, algorithm: Box<dyn MatchingAlgorithm>) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Build the matching engine
    pub fn build(self) -> Result<MatchingEngine, ConfigError> {
        let config = EngineConfig {
            instruments: self.instruments,
            ..EngineConfig::default()
        };
        config.validate()?;

        let algorithm = self
            .algorithm
            .unwrap_or_else(|| Box::new(PriceTimePriority::new()));
        let order_sink = self.order_sink.unwrap_or_else(|| Arc::new(NoOpSink));
        let trade_sink = self.trade_sink.unwrap_or_else(|| Arc::new(NoOpSink));

        let engine = MatchingEngine::new(algorithm, order_sink, trade_sink);
        for instrument in config.instruments {
            engine.add_instrument(instrument)?;
        }
        tracing::info!(
            instruments = engine.instrument_count(),
            algorithm = engine.algorithm_name(),
            "matching engine built"
        );
        Ok(engine)
    }
}
