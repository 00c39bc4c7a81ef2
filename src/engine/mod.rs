// ============================================================================
// Engine Module
// Contains the core matching engine business logic
// ============================================================================

mod matching_engine;
mod price_time;
mod registry;

pub mod factory;

pub use factory::{create_from_config, create_with_channels, MatchingEngineBuilder};
pub use matching_engine::MatchingEngine;
pub use price_time::PriceTimePriority;
