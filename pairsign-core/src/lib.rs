//! pairsign-core: Remote signing over a pairing session protocol
//!
//! A requester application asks a remote wallet to sign messages and
//! transactions without ever touching the keys. Both sides talk through a
//! session protocol client; this crate is the session lifecycle on top of
//! it:
//!
//! - **Signer** - [`Signer`] opens, reuses and closes a session and forwards
//!   signing requests over it
//! - **Wallet** - [`Wallet`] approves proposals with its custodian's address
//!   and answers every inbound request exactly once
//! - **Registrar** - [`ClientRegistrar`] builds at most one client handle per
//!   owner, sharing a single initialization among concurrent callers
//! - **Event bridge** - [`EventBridge`] republishes protocol events as
//!   [`BridgeEvent`]s
//! - **Matcher** - [`matcher::plan_open`] decides between reuse and a new
//!   handshake
//! - **In-memory relay** - [`MemoryRelay`] implements the protocol client
//!   in-process
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pairsign_core::{
//!     BridgeEvent, ClientSource, MemoryClientFactory, MemoryRelay, Signer, SignerConfig,
//! };
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = Arc::new(MemoryClientFactory::new(MemoryRelay::new()));
//!     let config = SignerConfig::with_chain_id(1);
//!     let signer = Signer::new(
//!         config.clone(),
//!         ClientSource::config(factory, config.client.clone()),
//!     );
//!
//!     // Show the pairing URI to the wallet while open() waits
//!     let mut events = signer.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok((_, event)) = events.recv().await {
//!             if let BridgeEvent::Uri { uri } = event {
//!                 println!("pair with {uri}");
//!             }
//!         }
//!     });
//!
//!     signer.open().await?;
//!     let signature = signer.sign_message("hello").await?;
//!     println!("{signature}");
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//!  Signer ──register──▶ ClientRegistrar ──init──▶ SessionClient ◀──relay──▶ SessionClient ◀── Wallet
//!    ▲                                                 │
//!    └────────── BridgeEvent ◀──── listener ◀──────────┘
//! ```

pub mod account;
pub mod config;
pub mod error;
pub mod events;
pub mod matcher;
pub mod protocol;
pub mod registrar;
pub mod signer;
pub mod transaction;
pub mod wallet;

// Re-export key types for convenience
pub use account::{AccountId, ChainId, DEFAULT_NAMESPACE};
pub use config::{SignerConfig, WalletConfig};
pub use error::{
    AccountIdError, ClientError, ConfigError, CustodianError, DispatchError, PairsignError,
    ProviderError, RegistrarError, SignerError, TransactionError, WalletError,
};
pub use events::{BridgeEvent, EventBridge, EventSeq};
pub use matcher::OpenPlan;
pub use protocol::{
    ClientConfig, ClientEvent, ClientFactory, JsonRpcRequest, JsonRpcResponse, MemoryClient,
    MemoryClientFactory, MemoryRelay, Metadata, Permissions, RequestEvent, ResponsePayload,
    Session, SessionClient,
};
pub use registrar::{ClientRegistrar, ClientSource, WireFn};
pub use signer::{ChainProvider, ConnectionState, OpenOptions, Signer, StaticChainProvider};
pub use transaction::TransactionRequest;
pub use wallet::{KeyCustodian, Wallet, WalletMethod};
