//! Session protocol data types
//!
//! These mirror what the session protocol client hands to the core. The core
//! never owns a session; it keeps snapshots of these values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default relay endpoint for the session protocol client
pub const DEFAULT_RELAY_URL: &str = "wss://relay.walletconnect.org";

/// JSON-RPC version string used on every request and response
pub const JSONRPC_VERSION: &str = "2.0";

/// Application metadata shown to the peer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

/// Configuration block for initializing a session protocol client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay endpoint
    pub relay_url: String,
    /// Client name; clients sharing a name share persisted sessions
    pub name: Option<String>,
    /// Relay project identifier
    pub project_id: Option<String>,
    /// Whether this client approves proposals (wallet side)
    pub controller: bool,
    /// Metadata advertised to peers
    pub metadata: Metadata,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            name: None,
            project_id: None,
            controller: false,
            metadata: Metadata::default(),
        }
    }
}

/// Chains a session may act on
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockchainPermissions {
    pub chains: Vec<String>,
}

/// JSON-RPC methods a session may call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JsonRpcPermissions {
    pub methods: Vec<String>,
}

/// Permission set requested by, and granted to, a session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permissions {
    pub blockchain: BlockchainPermissions,
    pub jsonrpc: JsonRpcPermissions,
}

impl Permissions {
    pub fn new(chains: Vec<String>, methods: Vec<String>) -> Self {
        Self {
            blockchain: BlockchainPermissions { chains },
            jsonrpc: JsonRpcPermissions { methods },
        }
    }

    pub fn chains(&self) -> &[String] {
        &self.blockchain.chains
    }

    pub fn methods(&self) -> &[String] {
        &self.jsonrpc.methods
    }
}

/// Account state bound to a session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub accounts: Vec<String>,
}

/// A settled session between a requester and an approver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub topic: String,
    pub permissions: Permissions,
    pub state: SessionState,
    /// Metadata of the other side
    pub peer: Metadata,
}

/// Pairing handshake initiation carrying a one-time connection URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingProposal {
    pub topic: String,
    pub uri: String,
}

/// Proposal for a new session, delivered to the approver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProposal {
    pub topic: String,
    pub proposer: Metadata,
    pub permissions: Permissions,
}

/// Approver's answer to a session proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub state: SessionState,
    pub metadata: Metadata,
}

/// Parameters for opening a new session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectParams {
    pub metadata: Metadata,
    pub permissions: Permissions,
}

/// Reason attached to disconnects and rejections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub code: i64,
    pub message: String,
}

impl Reason {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Method and params of an outgoing request; the client assigns the id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    pub method: String,
    pub params: Vec<Value>,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC request as delivered to the approver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub id: u64,
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// An inbound request on a session topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub topic: String,
    pub request: JsonRpcRequest,
}

/// Structured JSON-RPC error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: i64,
    pub message: String,
}

/// Either a result or an error, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Result { result: Value },
    Error { error: ErrorPayload },
}

/// A JSON-RPC response sent back on a session topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub id: u64,
    pub jsonrpc: String,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    /// Successful response to `request`
    pub fn result(request: &JsonRpcRequest, result: Value) -> Self {
        Self {
            id: request.id,
            jsonrpc: request.jsonrpc.clone(),
            payload: ResponsePayload::Result { result },
        }
    }

    /// Error response to `request`
    pub fn error(request: &JsonRpcRequest, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: request.id,
            jsonrpc: request.jsonrpc.clone(),
            payload: ResponsePayload::Error {
                error: ErrorPayload {
                    code,
                    message: message.into(),
                },
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error { .. })
    }
}

/// Raw events emitted by a session protocol client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    PairingProposed(PairingProposal),
    PairingCreated { topic: String },
    PairingDeleted { topic: String },
    SessionProposed(SessionProposal),
    SessionCreated(Session),
    SessionUpdated(Session),
    SessionDeleted(Session),
    RequestReceived(RequestEvent),
}

impl ClientEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::PairingProposed(_) => "pairing_proposed",
            Self::PairingCreated { .. } => "pairing_created",
            Self::PairingDeleted { .. } => "pairing_deleted",
            Self::SessionProposed(_) => "session_proposed",
            Self::SessionCreated(_) => "session_created",
            Self::SessionUpdated(_) => "session_updated",
            Self::SessionDeleted(_) => "session_deleted",
            Self::RequestReceived(_) => "request_received",
        }
    }
}
