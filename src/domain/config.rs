// ============================================================================
// Engine Configuration
// Instrument trading rules and event delivery settings
// ============================================================================

use super::errors::{ConfigError, RejectReason};
use super::order::{Price, Quantity};
use rust_decimal::Decimal;
use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Instrument Configuration
// ============================================================================

/// Largest quantity any single order may carry (10^18), whatever the
/// instrument's own `max_quantity`. Keeps level and book aggregates far
/// below `Decimal::MAX`.
pub const MAX_ORDER_QUANTITY: Quantity = Decimal::from_parts(0xA764_0000, 0x0DE0_B6B3, 0, false, 0);

/// Trading rules for one instrument
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InstrumentConfig {
    /// The trading instrument (e.g., "BTC-USD", "AAPL")
    pub symbol: String,

    /// Optional: Price tick size (minimum price increment)
    /// None means no tick size enforcement
    pub tick_size: Option<Decimal>,

    /// Optional: Lot size (minimum quantity increment)
    /// None means no lot size enforcement
    pub lot_size: Option<Decimal>,

    pub min_quantity: Option<Quantity>,
    pub max_quantity: Option<Quantity>,
}

impl InstrumentConfig {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size: None,
            lot_size: None,
            min_quantity: None,
            max_quantity: None,
        }
    }

    /// Builder method: Set price tick size
    pub fn with_tick_size(mut self, tick: Decimal) -> Self {
        self.tick_size = Some(tick);
        self
    }

    /// Builder method: Set lot size
    pub fn with_lot_size(mut self, lot: Decimal) -> Self {
        self.lot_size = Some(lot);
        self
    }

    pub fn with_min_quantity(mut self, minimum: Quantity) -> Self {
        self.min_quantity = Some(minimum);
        self
    }

    pub fn with_max_quantity(mut self, maximum: Quantity) -> Self {
        self.max_quantity = Some(maximum);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::EmptySymbol);
        }

        if matches!(self.tick_size, Some(tick) if tick <= Decimal::ZERO) {
            return Err(ConfigError::NonPositiveTickSize(self.symbol.clone()));
        }

        if matches!(self.lot_size, Some(lot) if lot <= Decimal::ZERO) {
            return Err(ConfigError::NonPositiveLotSize(self.symbol.clone()));
        }

        let min_ok = self.min_quantity.is_none_or(|min| min > Decimal::ZERO);
        let max_ok = self.max_quantity.is_none_or(|max| max > Decimal::ZERO);
        let ordered = match (self.min_quantity, self.max_quantity) {
            (Some(min), Some(max)) => min <= max,
            _ => true,
        };
        if !(min_ok && max_ok && ordered) {
            return Err(ConfigError::InvalidQuantityBounds(self.symbol.clone()));
        }

        Ok(())
    }

    /// Check a limit price against the tick size
    pub fn check_price(&self, price: Price) -> Result<(), RejectReason> {
        match self.tick_size {
            Some(tick_size) if !(price % tick_size).is_zero() => {
                Err(RejectReason::TickSizeViolation { price, tick_size })
            },
            _ => Ok(()),
        }
    }

    /// Upper quantity bound in force: the configured maximum, capped at
    /// [`MAX_ORDER_QUANTITY`]
    pub fn effective_max_quantity(&self) -> Quantity {
        self.max_quantity
            .map_or(MAX_ORDER_QUANTITY, |maximum| maximum.min(MAX_ORDER_QUANTITY))
    }

    /// Check an order quantity against the lot size and bounds
    pub fn check_quantity(&self, quantity: Quantity) -> Result<(), RejectReason> {
        if let Some(lot_size) = self.lot_size {
            if !(quantity % lot_size).is_zero() {
                return Err(RejectReason::LotSizeViolation { quantity, lot_size });
            }
        }
        if let Some(minimum) = self.min_quantity {
            if quantity < minimum {
                return Err(RejectReason::QuantityBelowMinimum { quantity, minimum });
            }
        }
        let maximum = self.effective_max_quantity();
        if quantity > maximum {
            return Err(RejectReason::QuantityAboveMaximum { quantity, maximum });
        }
        Ok(())
    }
}

// ============================================================================
// Preset Configurations (Factory Methods)
// ============================================================================

impl InstrumentConfig {
    /// Equity-style instrument
    /// - Tick size: $0.01
    /// - Whole shares
    pub fn equity(symbol: impl Into<String>) -> Self {
        Self::new(symbol)
            .with_tick_size(Decimal::new(1, 2))
            .with_lot_size(Decimal::ONE)
    }

    /// Crypto-style instrument
    /// - Tick size: 0.01
    /// - Lot size: 0.00001
    pub fn crypto(symbol: impl Into<String>) -> Self {
        Self::new(symbol)
            .with_tick_size(Decimal::new(1, 2))
            .with_lot_size(Decimal::new(1, 5))
    }
}

// ============================================================================
// Delivery Configuration
// ============================================================================

/// What a channel sink does when its queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OverflowPolicy {
    /// Drop the event being delivered and count it
    #[default]
    DropNewest,
    /// Wait for the consumer to make room.
    ///
    /// Delivery happens while the next operation on the same instrument
    /// waits for its turn with the book lock held, so a stalled consumer
    /// stalls all matching on that instrument. Lossless, at the cost of
    /// matching latency.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeliveryConfig {
    /// Bounded queue capacity per sink
    pub capacity: usize,
    #[cfg_attr(feature = "serde", serde(default))]
    pub overflow_policy: OverflowPolicy,
}

impl DeliveryConfig {
    pub fn new(capacity: usize, overflow_policy: OverflowPolicy) -> Self {
        Self {
            capacity,
            overflow_policy,
        }
    }

    /// Lossless delivery; producers wait on a slow consumer
    pub fn lossless(capacity: usize) -> Self {
        Self::new(capacity, OverflowPolicy::Block)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self::new(65_536, OverflowPolicy::DropNewest)
    }
}

// ============================================================================
// Engine Configuration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    pub instruments: Vec<InstrumentConfig>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub delivery: DeliveryConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instrument(mut self, instrument: InstrumentConfig) -> Self {
        self.instruments.push(instrument);
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for instrument in &self.instruments {
            instrument.validate()?;
            if !seen.insert(instrument.symbol.as_str()) {
                return Err(ConfigError::DuplicateSymbol(instrument.symbol.clone()));
            }
        }
        self.delivery.validate()
    }

    /// Parse and validate a JSON configuration document
    #[cfg(feature = "serde")]
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = InstrumentConfig::new("BTC-USD");

        assert_eq!(config.symbol, "BTC-USD");
        assert_eq!(config.tick_size, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = InstrumentConfig::equity("AAPL")
            .with_min_quantity(Decimal::from(1))
            .with_max_quantity(Decimal::from(10_000));

        assert_eq!(config.tick_size, Some(Decimal::new(1, 2)));
        assert_eq!(config.lot_size, Some(Decimal::ONE));
        assert_eq!(config.max_quantity, Some(Decimal::from(10_000)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            InstrumentConfig::new("").validate(),
            Err(ConfigError::EmptySymbol)
        );
        assert_eq!(
            InstrumentConfig::new("X").with_tick_size(Decimal::ZERO).validate(),
            Err(ConfigError::NonPositiveTickSize("X".to_string()))
        );
        assert_eq!(
            InstrumentConfig::new("X")
                .with_min_quantity(Decimal::from(10))
                .with_max_quantity(Decimal::from(5))
                .validate(),
            Err(ConfigError::InvalidQuantityBounds("X".to_string()))
        );
    }

    #[test]
    fn test_price_and_quantity_checks() {
        let config = InstrumentConfig::equity("AAPL").with_max_quantity(Decimal::from(100));

        assert!(config.check_price(Decimal::new(15025, 2)).is_ok());
        assert!(matches!(
            config.check_price(Decimal::new(150255, 3)),
            Err(RejectReason::TickSizeViolation { .. })
        ));
        assert!(config.check_quantity(Decimal::from(100)).is_ok());
        assert!(matches!(
            config.check_quantity(Decimal::new(15, 1)),
            Err(RejectReason::LotSizeViolation { .. })
        ));
        assert!(matches!(
            config.check_quantity(Decimal::from(101)),
            Err(RejectReason::QuantityAboveMaximum { .. })
        ));
    }

    #[test]
    fn test_quantity_capped_without_configured_maximum() {
        let config = InstrumentConfig::new("BTC-USD");
        assert_eq!(config.effective_max_quantity(), Decimal::from(10u64.pow(18)));
        assert!(config.check_quantity(MAX_ORDER_QUANTITY).is_ok());
        assert_eq!(
            config.check_quantity(Decimal::MAX),
            Err(RejectReason::QuantityAboveMaximum {
                quantity: Decimal::MAX,
                maximum: MAX_ORDER_QUANTITY,
            })
        );

        // A configured maximum above the cap does not lift it
        let config = InstrumentConfig::new("BTC-USD").with_max_quantity(Decimal::MAX);
        assert_eq!(config.effective_max_quantity(), MAX_ORDER_QUANTITY);
    }

    #[test]
    fn test_engine_config_rejects_duplicates() {
        let config = EngineConfig::new()
            .with_instrument(InstrumentConfig::new("BTC-USD"))
            .with_instrument(InstrumentConfig::new("BTC-USD"));
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateSymbol("BTC-USD".to_string()))
        );

        let config = EngineConfig::new().with_delivery(DeliveryConfig::lossless(0));
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json_str() {
        let json = r#"{
            "instruments": [
                { "symbol": "BTC-USD", "tick_size": "0.01", "lot_size": "0.001" },
                { "symbol": "ETH-USD" }
            ],
            "delivery": { "capacity": 1024, "overflow_policy": "Block" }
        }"#;

        let config = EngineConfig::from_json_str(json).unwrap();
        assert_eq!(config.instruments.len(), 2);
        assert_eq!(config.instruments[0].tick_size, Some(Decimal::new(1, 2)));
        assert_eq!(config.delivery, DeliveryConfig::lossless(1024));

        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
