//! Session protocol client abstraction

pub mod memory;
pub mod traits;
pub mod types;

// Re-export key types for convenience
pub use memory::{MemoryClient, MemoryClientFactory, MemoryRelay};
pub use traits::{ClientFactory, SessionClient};
pub use types::{
    ApprovalResponse, ClientConfig, ClientEvent, ConnectParams, DEFAULT_RELAY_URL, ErrorPayload,
    JSONRPC_VERSION, JsonRpcRequest, JsonRpcResponse, Metadata, PairingProposal, Permissions,
    Reason, RequestArguments, RequestEvent, ResponsePayload, Session, SessionProposal,
    SessionState,
};
