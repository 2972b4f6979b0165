//! In-memory session protocol client
//!
//! MemoryRelay plays the part of the relay network and of each client's
//! session storage, so a requester and an approver can pair, settle sessions
//! and exchange requests inside one process. It is used by the test suites
//! and by anyone embedding both sides in a single runtime.
//!
//! Clients initialized with the same `ClientConfig::name` share one session
//! store and one event stream, modelling a client that persists its state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, trace};
use uuid::Uuid;

use super::traits::{ClientFactory, SessionClient};
use super::types::{
    ApprovalResponse, ClientConfig, ClientEvent, ConnectParams, JsonRpcRequest, JsonRpcResponse,
    JSONRPC_VERSION, PairingProposal, Reason, RequestArguments, RequestEvent, ResponsePayload,
    Session, SessionProposal, SessionState,
};
use crate::error::ClientError;

const EVENT_CAPACITY: usize = 64;

struct Peer {
    events: broadcast::Sender<ClientEvent>,
    sessions: Vec<Session>,
}

impl Peer {
    fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            sessions: Vec::new(),
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

struct PendingPairing {
    proposer: String,
    params: ConnectParams,
    settle: oneshot::Sender<Result<Session, ClientError>>,
}

struct SessionLink {
    proposer: String,
    approver: String,
}

impl SessionLink {
    fn other(&self, identity: &str) -> Option<&str> {
        if self.proposer == identity {
            Some(&self.approver)
        } else if self.approver == identity {
            Some(&self.proposer)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct RelayState {
    peers: HashMap<String, Peer>,
    /// Pairings waiting for `pair()`, by pairing topic
    pairings: HashMap<String, PendingPairing>,
    /// Proposals waiting for approval, by proposal topic
    proposals: HashMap<String, PendingPairing>,
    sessions: HashMap<String, SessionLink>,
    requests: HashMap<(String, u64), oneshot::Sender<JsonRpcResponse>>,
}

impl RelayState {
    fn peer(&mut self, identity: &str) -> &mut Peer {
        self.peers
            .entry(identity.to_string())
            .or_insert_with(Peer::new)
    }
}

/// In-process relay connecting [`MemoryClient`]s
#[derive(Default)]
pub struct MemoryRelay {
    state: Mutex<RelayState>,
    next_request_id: AtomicU64,
}

impl MemoryRelay {
    /// Create a new relay
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a client with the given identity
    pub fn client(self: &Arc<Self>, identity: impl Into<String>) -> MemoryClient {
        let identity = identity.into();
        self.lock().peer(&identity);
        MemoryClient {
            identity,
            relay: Arc::clone(self),
        }
    }

    /// Number of settled sessions across the relay
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Number of requests still waiting for a response
    pub fn pending_request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Session protocol client backed by a [`MemoryRelay`]
#[derive(Clone)]
pub struct MemoryClient {
    identity: String,
    relay: Arc<MemoryRelay>,
}

impl MemoryClient {
    fn pairing_topic(uri: &str) -> Option<&str> {
        uri.strip_prefix("wc:")?.split('@').next()
    }
}

#[async_trait]
impl SessionClient for MemoryClient {
    fn context(&self) -> &str {
        &self.identity
    }

    fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.relay.lock().peer(&self.identity).events.subscribe()
    }

    async fn connect(&self, params: ConnectParams) -> Result<Session, ClientError> {
        let topic = Uuid::new_v4().to_string();
        let uri = format!("wc:{topic}@2?relay-protocol=memory");
        let (settle, settled) = oneshot::channel();

        {
            let mut state = self.relay.lock();
            state.pairings.insert(
                topic.clone(),
                PendingPairing {
                    proposer: self.identity.clone(),
                    params,
                    settle,
                },
            );
            debug!(client = %self.identity, topic = %topic, "Pairing proposed");
            state
                .peer(&self.identity)
                .emit(ClientEvent::PairingProposed(PairingProposal { topic, uri }));
        }

        settled.await.map_err(|_| ClientError::Closed)?
    }

    async fn pair(&self, uri: &str) -> Result<(), ClientError> {
        let topic = Self::pairing_topic(uri)
            .ok_or_else(|| ClientError::UnknownPairing(uri.to_string()))?
            .to_string();

        let mut state = self.relay.lock();
        let pending = state
            .pairings
            .remove(&topic)
            .ok_or_else(|| ClientError::UnknownPairing(uri.to_string()))?;

        let proposal = SessionProposal {
            topic: topic.clone(),
            proposer: pending.params.metadata.clone(),
            permissions: pending.params.permissions.clone(),
        };
        let proposer = pending.proposer.clone();
        state.proposals.insert(topic.clone(), pending);

        debug!(client = %self.identity, topic = %topic, "Pairing consumed");
        let created = ClientEvent::PairingCreated {
            topic: topic.clone(),
        };
        state.peer(&proposer).emit(created.clone());
        if proposer != self.identity {
            state.peer(&self.identity).emit(created);
        }
        state
            .peer(&self.identity)
            .emit(ClientEvent::SessionProposed(proposal));
        Ok(())
    }

    async fn approve(
        &self,
        proposal: &SessionProposal,
        response: ApprovalResponse,
    ) -> Result<Session, ClientError> {
        let mut state = self.relay.lock();
        let pending = state
            .proposals
            .remove(&proposal.topic)
            .ok_or_else(|| ClientError::UnknownProposal(proposal.topic.clone()))?;

        let topic = Uuid::new_v4().to_string();
        let proposer_view = Session {
            topic: topic.clone(),
            permissions: pending.params.permissions.clone(),
            state: response.state.clone(),
            peer: response.metadata,
        };
        let approver_view = Session {
            peer: pending.params.metadata.clone(),
            ..proposer_view.clone()
        };

        state.sessions.insert(
            topic.clone(),
            SessionLink {
                proposer: pending.proposer.clone(),
                approver: self.identity.clone(),
            },
        );
        for (identity, view) in [
            (&pending.proposer, &proposer_view),
            (&self.identity, &approver_view),
        ] {
            let peer = state.peer(identity);
            peer.sessions.push(view.clone());
            peer.emit(ClientEvent::SessionCreated(view.clone()));
        }
        drop(state);

        debug!(client = %self.identity, topic = %topic, "Session settled");
        let _ = pending.settle.send(Ok(proposer_view));
        Ok(approver_view)
    }

    async fn reject(&self, proposal: &SessionProposal, reason: Reason) -> Result<(), ClientError> {
        let pending = self
            .relay
            .lock()
            .proposals
            .remove(&proposal.topic)
            .ok_or_else(|| ClientError::UnknownProposal(proposal.topic.clone()))?;

        let _ = pending.settle.send(Err(ClientError::Rejected {
            code: reason.code,
            message: reason.message,
        }));
        Ok(())
    }

    async fn update(&self, topic: &str, session_state: SessionState) -> Result<Session, ClientError> {
        let mut state = self.relay.lock();
        let link = state
            .sessions
            .get(topic)
            .ok_or_else(|| ClientError::UnknownTopic(topic.to_string()))?;
        let sides = [link.proposer.clone(), link.approver.clone()];

        let mut own_view = None;
        for identity in sides {
            let peer = state.peer(&identity);
            if let Some(session) = peer.sessions.iter_mut().find(|s| s.topic == topic) {
                session.state = session_state.clone();
                let updated = session.clone();
                if identity == self.identity {
                    own_view = Some(updated.clone());
                }
                peer.emit(ClientEvent::SessionUpdated(updated));
            }
        }

        own_view.ok_or_else(|| ClientError::UnknownTopic(topic.to_string()))
    }

    async fn disconnect(&self, topic: &str, reason: Reason) -> Result<(), ClientError> {
        let mut state = self.relay.lock();
        let link = state
            .sessions
            .remove(topic)
            .ok_or_else(|| ClientError::UnknownTopic(topic.to_string()))?;

        debug!(
            client = %self.identity,
            topic = %topic,
            code = reason.code,
            reason = %reason.message,
            "Session deleted"
        );

        // Outstanding requests on the topic can never be answered now
        state.requests.retain(|(t, _), _| t != topic);

        for identity in [link.proposer, link.approver] {
            let peer = state.peer(&identity);
            if let Some(index) = peer.sessions.iter().position(|s| s.topic == topic) {
                let session = peer.sessions.remove(index);
                peer.emit(ClientEvent::SessionDeleted(session));
            }
        }
        Ok(())
    }

    async fn request(&self, topic: &str, request: RequestArguments) -> Result<Value, ClientError> {
        let id = self.relay.next_request_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.relay.lock();
            let target = state
                .sessions
                .get(topic)
                .and_then(|link| link.other(&self.identity))
                .ok_or_else(|| ClientError::UnknownTopic(topic.to_string()))?
                .to_string();

            state.requests.insert((topic.to_string(), id), tx);
            trace!(client = %self.identity, topic = %topic, id, method = %request.method, "Request sent");
            state
                .peer(&target)
                .emit(ClientEvent::RequestReceived(RequestEvent {
                    topic: topic.to_string(),
                    request: JsonRpcRequest {
                        id,
                        jsonrpc: JSONRPC_VERSION.to_string(),
                        method: request.method,
                        params: request.params,
                    },
                }));
        }

        let response = rx.await.map_err(|_| ClientError::Closed)?;
        match response.payload {
            ResponsePayload::Result { result } => Ok(result),
            ResponsePayload::Error { error } => Err(ClientError::Remote {
                code: error.code,
                message: error.message,
            }),
        }
    }

    async fn respond(&self, topic: &str, response: JsonRpcResponse) -> Result<(), ClientError> {
        let id = response.id;
        let tx = self
            .relay
            .lock()
            .requests
            .remove(&(topic.to_string(), id))
            .ok_or_else(|| ClientError::UnknownRequest {
                topic: topic.to_string(),
                id,
            })?;
        tx.send(response).map_err(|_| ClientError::Closed)
    }

    async fn sessions(&self) -> Vec<Session> {
        self.relay.lock().peer(&self.identity).sessions.clone()
    }
}

/// Factory producing [`MemoryClient`]s on a shared relay
pub struct MemoryClientFactory {
    relay: Arc<MemoryRelay>,
    inits: AtomicUsize,
}

impl MemoryClientFactory {
    pub fn new(relay: Arc<MemoryRelay>) -> Self {
        Self {
            relay,
            inits: AtomicUsize::new(0),
        }
    }

    pub fn relay(&self) -> &Arc<MemoryRelay> {
        &self.relay
    }

    /// Number of clients this factory has initialized
    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientFactory for MemoryClientFactory {
    async fn init(&self, config: &ClientConfig) -> Result<Arc<dyn SessionClient>, ClientError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        let identity = config
            .name
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        debug!(client = %identity, relay = %config.relay_url, "Memory client initialized");
        Ok(Arc::new(self.relay.client(identity)))
    }
}
