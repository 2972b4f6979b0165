//! Approver dispatcher and key custodian

pub mod custodian;
pub mod dispatcher;
pub mod methods;

// Re-export key types for convenience
pub use custodian::KeyCustodian;
pub use dispatcher::{UNSUPPORTED_CHAINS_CODE, Wallet};
pub use methods::WalletMethod;
