//! SessionClient trait and factory
//!
//! The session protocol client owns transport, encryption, relay and session
//! storage. The core only talks to it through these traits, so any client
//! (the in-memory relay, a real relay client) can be plugged in.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::types::{
    ApprovalResponse, ClientConfig, ClientEvent, ConnectParams, JsonRpcResponse, Reason,
    RequestArguments, Session, SessionProposal, SessionState,
};
use crate::error::ClientError;

/// An initialized session protocol client handle
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Identity of this client within the protocol
    fn context(&self) -> &str;

    /// Subscribe to raw protocol events
    fn subscribe(&self) -> broadcast::Receiver<ClientEvent>;

    /// Propose a new session and wait until it is settled
    async fn connect(&self, params: ConnectParams) -> Result<Session, ClientError>;

    /// Consume a pairing URI produced by the other side
    async fn pair(&self, uri: &str) -> Result<(), ClientError>;

    /// Approve a session proposal
    async fn approve(
        &self,
        proposal: &SessionProposal,
        response: ApprovalResponse,
    ) -> Result<Session, ClientError>;

    /// Reject a session proposal
    async fn reject(&self, proposal: &SessionProposal, reason: Reason) -> Result<(), ClientError>;

    /// Replace the account state of a session
    async fn update(&self, topic: &str, state: SessionState) -> Result<Session, ClientError>;

    /// Delete a session
    async fn disconnect(&self, topic: &str, reason: Reason) -> Result<(), ClientError>;

    /// Send a request on a session and wait for the peer's result
    async fn request(&self, topic: &str, request: RequestArguments) -> Result<Value, ClientError>;

    /// Answer a request received on a session
    async fn respond(&self, topic: &str, response: JsonRpcResponse) -> Result<(), ClientError>;

    /// Settled sessions known to this client, in store order
    async fn sessions(&self) -> Vec<Session>;
}

/// Factory for initializing session protocol clients
///
/// Enables dependency injection of client implementations.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Initialize a new client from configuration
    async fn init(&self, config: &ClientConfig) -> Result<Arc<dyn SessionClient>, ClientError>;
}
