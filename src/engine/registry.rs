// ============================================================================
// Instrument Registry
// Arena of order books indexed by symbol
// ============================================================================

use crate::domain::{ConfigError, InstrumentConfig, OrderBook};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// One instrument: its rules, its book, and the lock that orders delivery
/// of the book's events.
pub(crate) struct BookSlot {
    pub(crate) index: usize,
    pub(crate) symbol: Arc<str>,
    pub(crate) config: InstrumentConfig,
    pub(crate) book: Mutex<OrderBook>,
    /// Taken before the book lock is released; held while delivering
    pub(crate) dispatch: Mutex<()>,
}

#[derive(Default)]
struct RegistryInner {
    by_symbol: HashMap<Arc<str>, usize>,
    slots: Vec<Arc<BookSlot>>,
}

/// Append-only: a registered instrument keeps its index for the life of the
/// engine, so routes can refer to slots by index.
#[derive(Default)]
pub(crate) struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, config: InstrumentConfig) -> Result<Arc<BookSlot>, ConfigError> {
        config.validate()?;

        let mut inner = self.inner.write();
        if inner.by_symbol.contains_key(config.symbol.as_str()) {
            return Err(ConfigError::DuplicateSymbol(config.symbol));
        }

        let index = inner.slots.len();
        let symbol: Arc<str> = Arc::from(config.symbol.as_str());
        let slot = Arc::new(BookSlot {
            index,
            symbol: Arc::clone(&symbol),
            book: Mutex::new(OrderBook::new(Arc::clone(&symbol))),
            dispatch: Mutex::new(()),
            config,
        });
        inner.slots.push(Arc::clone(&slot));
        inner.by_symbol.insert(symbol, index);
        Ok(slot)
    }

    pub(crate) fn lookup(&self, symbol: &str) -> Option<Arc<BookSlot>> {
        let inner = self.inner.read();
        let index = *inner.by_symbol.get(symbol)?;
        inner.slots.get(index).cloned()
    }

    pub(crate) fn slot(&self, index: usize) -> Option<Arc<BookSlot>> {
        self.inner.read().slots.get(index).cloned()
    }

    /// Symbols in registration order
    pub(crate) fn symbols(&self) -> Vec<String> {
        self.inner
            .read()
            .slots
            .iter()
            .map(|slot| slot.symbol.to_string())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().slots.len()
    }
}
