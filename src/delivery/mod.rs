// ============================================================================
// Delivery Module
// Queue-backed sinks that keep slow consumers off the matching path
// ============================================================================

mod channel;
#[cfg(feature = "async")]
mod tokio_sink;

pub use channel::{ChannelSink, DeliveryStats};
#[cfg(feature = "async")]
pub use tokio_sink::TokioSink;
