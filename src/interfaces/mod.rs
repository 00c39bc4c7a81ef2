// ============================================================================
// Interfaces Module
// Contains all trait definitions and contracts
// ============================================================================

mod event_sink;
mod matching_algorithm;

pub use event_sink::{LoggingSink, MemorySink, NoOpSink, OrderUpdateSink, TradeSink};
pub use matching_algorithm::{Fill, Fills, MatchingAlgorithm};
