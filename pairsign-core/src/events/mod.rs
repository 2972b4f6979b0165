//! Event bridge between the protocol client and the host application

pub mod bridge;
pub mod types;

// Re-export key types for convenience
pub use bridge::{DEFAULT_CAPACITY, EventBridge, EventSeq};
pub use types::BridgeEvent;
