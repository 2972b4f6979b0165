//! Requester session controller

pub mod controller;
pub mod provider;
pub mod state;

// Re-export key types for convenience
pub use controller::{CLOSE_REASON_CODE, CLOSE_REASON_MESSAGE, OpenOptions, Signer};
pub use provider::{ChainProvider, StaticChainProvider};
pub use state::ConnectionState;
