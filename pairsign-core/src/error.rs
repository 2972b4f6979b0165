//! Error types for pairsign-core

use thiserror::Error;

/// Top-level error type for pairsign-core
#[derive(Error, Debug)]
pub enum PairsignError {
    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Registrar error: {0}")]
    Registrar(#[from] RegistrarError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors reported by a session protocol client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Failed to initialize session client: {0}")]
    InitFailed(String),

    #[error("Unknown pairing: {0}")]
    UnknownPairing(String),

    #[error("Unknown proposal: {0}")]
    UnknownProposal(String),

    #[error("No session for topic {0}")]
    UnknownTopic(String),

    #[error("No pending request {id} on topic {topic}")]
    UnknownRequest { topic: String, id: u64 },

    #[error("Proposal rejected ({code}): {message}")]
    Rejected { code: i64, message: String },

    /// The peer answered with a JSON-RPC error
    #[error("Remote error ({code}): {message}")]
    Remote { code: i64, message: String },

    #[error("Session client closed")]
    Closed,
}

/// Errors from the lazy client registrar
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrarError {
    /// Initialization finished without producing a handle
    #[error("Client initialization failed: {0}")]
    InitFailed(String),

    /// The initializing task went away before signalling completion
    #[error("Client not initialized")]
    NotInitialized,
}

/// Errors surfaced by the requester-side signer
#[derive(Error, Debug)]
pub enum SignerError {
    #[error(
        "Signer must be configured with a chain id when no chain provider is attached or the provider cannot report one"
    )]
    MissingChainId,

    #[error("Client must be enabled before you can list accounts")]
    NotEnabled,

    #[error("Signer connection is missing session")]
    MissingSession,

    #[error("Open was interrupted: {0}")]
    OpenAborted(String),

    #[error("Unexpected result for {method}: {value}")]
    UnexpectedResult {
        method: String,
        value: serde_json::Value,
    },

    #[error(transparent)]
    Registrar(#[from] RegistrarError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Account(#[from] AccountIdError),
}

/// Errors surfaced by the approver-side wallet
#[derive(Error, Debug)]
pub enum WalletError {
    #[error(transparent)]
    Registrar(#[from] RegistrarError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Custodian(#[from] CustodianError),

    #[error(transparent)]
    Account(#[from] AccountIdError),
}

/// Failures while handling a single inbound request
///
/// These never cross the protocol boundary as errors; the dispatcher turns
/// each one into a JSON-RPC error response.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Wallet has not implemented method {0}")]
    MethodNotImplemented(String),

    #[error("Invalid params for {method}: {reason}")]
    InvalidParams { method: String, reason: String },

    #[error("No active session found for request on topic {0}")]
    NoSession(String),

    #[error(transparent)]
    Custodian(#[from] CustodianError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl DispatchError {
    /// JSON-RPC error code carried in the response
    pub fn code(&self) -> i64 {
        match self {
            Self::MethodNotImplemented(_) => -32601,
            Self::InvalidParams { .. } | Self::Transaction(_) => -32602,
            Self::NoSession(_) => -32000,
            Self::Custodian(e) => e.code,
        }
    }
}

/// Failure reported by the key custodian
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct CustodianError {
    pub code: i64,
    pub message: String,
}

impl CustodianError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Failure reported by a chain provider
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Chain provider error: {0}")]
pub struct ProviderError(pub String);

/// Errors while normalizing a transaction request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("Transaction must be a JSON object")]
    NotAnObject,

    #[error("Field {field} is not a valid quantity: {value}")]
    InvalidQuantity { field: String, value: String },
}

/// Errors parsing chain or account identifiers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccountIdError {
    #[error("Invalid chain identifier: {0}")]
    InvalidChain(String),

    #[error("Invalid account identifier: {0}")]
    InvalidAccount(String),
}

/// Errors loading configuration files
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
