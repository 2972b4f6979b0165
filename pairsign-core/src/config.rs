//! Configuration for the signer and the wallet
//!
//! Both configs deserialize from TOML with every field optional; missing
//! fields take the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::account::DEFAULT_NAMESPACE;
use crate::error::ConfigError;
use crate::protocol::{ClientConfig, Metadata};

/// Methods a signer asks permission for by default
pub const DEFAULT_SIGNER_METHODS: [&str; 4] = [
    "eth_sendTransaction",
    "personal_sign",
    "eth_signTypedData",
    "eth_signTransaction",
];

/// Requester-side configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Chain to use when no chain provider is attached
    pub chain_id: Option<u64>,

    /// JSON-RPC methods requested for the session
    pub methods: Vec<String>,

    /// Blockchain namespace of the requested chain
    pub namespace: String,

    /// Session protocol client options
    pub client: ClientConfig,

    /// Log request and response payloads
    pub debug: bool,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            chain_id: None,
            methods: DEFAULT_SIGNER_METHODS.iter().map(|m| m.to_string()).collect(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            client: ClientConfig {
                metadata: Metadata {
                    name: "Some dApp".to_string(),
                    description: "Some example dApp".to_string(),
                    url: "https://walletconnect.org/".to_string(),
                    icons: vec![
                        "https://gblobscdn.gitbook.com/spaces%2F-LJJeCjcLrr53DcT1Ml7%2Favatar.png?alt=media"
                            .to_string(),
                    ],
                },
                ..ClientConfig::default()
            },
            debug: false,
        }
    }
}

impl SignerConfig {
    /// Config bound to a fixed chain
    pub fn with_chain_id(chain_id: u64) -> Self {
        Self {
            chain_id: Some(chain_id),
            ..Self::default()
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

/// Approver-side configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Namespace used when a proposal names no chain
    pub namespace: String,

    /// Session protocol client options
    pub client: ClientConfig,

    /// Log request and response payloads
    pub debug: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            client: ClientConfig {
                name: Some("WalletClient".to_string()),
                controller: true,
                metadata: Metadata {
                    name: "Test wallet".to_string(),
                    description: "Just a Wallet client for testing".to_string(),
                    url: "https://walletconnect.io".to_string(),
                    icons: vec!["https://walletconnect.org/walletconnect-logo.png".to_string()],
                },
                ..ClientConfig::default()
            },
            debug: false,
        }
    }
}

impl WalletConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}
