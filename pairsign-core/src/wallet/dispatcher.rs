//! Wallet: approver-side proposal and request dispatcher
//!
//! The wallet approves every session proposal with the custodian's address
//! and answers every inbound request exactly once. Handler failures never
//! escape; they become JSON-RPC error responses.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::custodian::KeyCustodian;
use super::methods;
use crate::account::{AccountId, ChainId};
use crate::config::WalletConfig;
use crate::error::{DispatchError, WalletError};
use crate::events::{BridgeEvent, EventBridge, EventSeq};
use crate::protocol::{
    ApprovalResponse, ClientEvent, JsonRpcResponse, Reason, RequestEvent, Session, SessionClient,
    SessionProposal, SessionState,
};
use crate::registrar::{ClientRegistrar, ClientSource, WireFn};

/// Reason code sent when a proposal cannot be approved
pub const UNSUPPORTED_CHAINS_CODE: i64 = 5100;

struct WalletInner {
    config: WalletConfig,
    custodian: Arc<dyn KeyCustodian>,
    registrar: ClientRegistrar,
    bridge: EventBridge,
    /// Topics of settled sessions not yet reported closed
    served: Mutex<HashSet<String>>,
}

/// Approver-side dispatcher
#[derive(Clone)]
pub struct Wallet {
    inner: Arc<WalletInner>,
}

impl Wallet {
    pub fn new(
        config: WalletConfig,
        source: ClientSource,
        custodian: Arc<dyn KeyCustodian>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<WalletInner>| {
            let weak = weak.clone();
            let wire: WireFn = Arc::new(move |client, shutdown| {
                if let Some(inner) = weak.upgrade() {
                    inner.attach(client, shutdown);
                }
            });

            WalletInner {
                registrar: ClientRegistrar::new(source, wire),
                config,
                custodian,
                bridge: EventBridge::default(),
                served: Mutex::new(HashSet::new()),
            }
        });

        Self { inner }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.inner.config
    }

    /// Subscribe to lifecycle events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<(EventSeq, BridgeEvent)> {
        self.inner.bridge.subscribe()
    }

    /// Event bridge, for replay and waiting
    pub fn events(&self) -> &EventBridge {
        &self.inner.bridge
    }

    /// Register the session client if it is not registered yet
    pub async fn register(&self) -> Result<Arc<dyn SessionClient>, WalletError> {
        Ok(self.inner.registrar.register().await?)
    }

    /// Sessions the wallet currently serves
    pub async fn sessions(&self) -> Result<Vec<Session>, WalletError> {
        Ok(self.register().await?.sessions().await)
    }

    /// Consume a pairing URI shown by a requester
    pub async fn pair(&self, uri: &str) -> Result<(), WalletError> {
        let client = self.register().await?;
        info!(uri = %uri, "Pairing with requester");
        client.pair(uri).await?;
        Ok(())
    }

    /// Release the session client
    ///
    /// Publishes `Close` for every session the client was serving. The
    /// sessions themselves stay in the client's store.
    pub async fn close(&self) -> Result<(), WalletError> {
        let client = self.register().await?;
        let sessions = client.sessions().await;
        self.inner.registrar.reset();
        self.inner.lock_served().clear();
        for session in sessions {
            self.inner.bridge.publish(BridgeEvent::Close {
                topic: session.topic,
            });
        }
        Ok(())
    }

    /// Answer one inbound request and return the response that was sent
    pub async fn dispatch(&self, event: RequestEvent) -> Result<JsonRpcResponse, WalletError> {
        let client = self.register().await?;
        Ok(self.inner.dispatch(client.as_ref(), &event).await)
    }
}

impl WalletInner {
    fn lock_served(&self) -> MutexGuard<'_, HashSet<String>> {
        self.served
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start the listener for a freshly registered client
    fn attach(self: Arc<Self>, client: Arc<dyn SessionClient>, shutdown: CancellationToken) {
        let mut events = client.subscribe();
        let weak = Arc::downgrade(&self);

        tokio::spawn(async move {
            debug!(client = client.context(), "Wallet listening");
            let stored = client.sessions().await;
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock_served()
                    .extend(stored.into_iter().map(|session| session.topic));
            }
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) => {
                            let Some(inner) = weak.upgrade() else { break };
                            inner.handle_client_event(client.as_ref(), event).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(client = client.context(), skipped, "Wallet listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!(client = client.context(), "Wallet listener stopped");
        });

        self.bridge.publish(BridgeEvent::Init);
    }

    async fn handle_client_event(&self, client: &dyn SessionClient, event: ClientEvent) {
        match event {
            ClientEvent::PairingProposed(proposal) => {
                self.bridge.publish(BridgeEvent::Uri { uri: proposal.uri });
            }
            ClientEvent::SessionProposed(proposal) => {
                if let Err(e) = self.approve(client, &proposal).await {
                    error!(topic = %proposal.topic, error = %e, "Failed to approve session proposal");
                    let reason = Reason::new(UNSUPPORTED_CHAINS_CODE, e.to_string());
                    if let Err(e) = client.reject(&proposal, reason).await {
                        warn!(topic = %proposal.topic, error = %e, "Failed to reject session proposal");
                    }
                }
            }
            ClientEvent::SessionCreated(session) | ClientEvent::SessionUpdated(session) => {
                debug!(topic = %session.topic, "Session state changed");
                self.lock_served().insert(session.topic.clone());
                self.bridge.publish(BridgeEvent::StatusUpdate { session });
            }
            ClientEvent::SessionDeleted(session) => {
                let remaining = client.sessions().await;
                info!(topic = %session.topic, remaining = remaining.len(), "Session deleted");
                self.on_deleted(&session.topic, &remaining);
            }
            ClientEvent::RequestReceived(request) => {
                self.dispatch(client, &request).await;
            }
            other => trace!(event = other.name(), "Ignoring client event"),
        }
    }

    /// Report every served session that is gone, `deleted` first
    ///
    /// Each served topic is reported once. The client is released once
    /// nothing is left to serve; that stops this listener, so deletions still
    /// queued behind this one are reported here.
    fn on_deleted(&self, deleted: &str, remaining: &[Session]) {
        let mut served = self.lock_served();
        let mut closed = Vec::new();
        if served.remove(deleted) {
            closed.push(deleted.to_string());
        }
        served.retain(|topic| {
            let live = remaining.iter().any(|s| &s.topic == topic);
            if !live {
                closed.push(topic.clone());
            }
            live
        });

        if remaining.is_empty() {
            self.registrar.reset();
        }
        for topic in closed {
            self.bridge.publish(BridgeEvent::Close { topic });
        }
    }

    async fn approve(
        &self,
        client: &dyn SessionClient,
        proposal: &SessionProposal,
    ) -> Result<Session, WalletError> {
        let chain: ChainId = match proposal.permissions.chains().first() {
            Some(chain) => chain.parse()?,
            None => ChainId::new(&self.config.namespace, self.custodian.chain_id().await?),
        };
        let account = AccountId::new(chain, self.custodian.address()).to_string();
        info!(topic = %proposal.topic, proposer = %proposal.proposer.name, account = %account, "Approving session proposal");

        let session = client
            .approve(
                proposal,
                ApprovalResponse {
                    state: SessionState {
                        accounts: vec![account],
                    },
                    metadata: self.config.client.metadata.clone(),
                },
            )
            .await?;
        Ok(session)
    }

    /// Build the single response for `event` and send it
    async fn dispatch(&self, client: &dyn SessionClient, event: &RequestEvent) -> JsonRpcResponse {
        let request = &event.request;
        debug!(topic = %event.topic, id = request.id, method = %request.method, "Request received");
        if self.config.debug {
            debug!(method = %request.method, params = ?request.params, "Request payload");
        }

        let response = match self.handle_request(client, event).await {
            Ok(result) => {
                if self.config.debug {
                    debug!(method = %request.method, result = %result, "Response payload");
                }
                JsonRpcResponse::result(request, result)
            }
            Err(e) => {
                warn!(topic = %event.topic, method = %request.method, code = e.code(), error = %e, "Request failed");
                JsonRpcResponse::error(request, e.code(), e.to_string())
            }
        };

        if let Err(e) = client.respond(&event.topic, response.clone()).await {
            error!(topic = %event.topic, id = request.id, error = %e, "Failed to deliver response");
        }
        response
    }

    async fn handle_request(
        &self,
        client: &dyn SessionClient,
        event: &RequestEvent,
    ) -> Result<serde_json::Value, DispatchError> {
        let known = client
            .sessions()
            .await
            .iter()
            .any(|session| session.topic == event.topic);
        if !known {
            return Err(DispatchError::NoSession(event.topic.clone()));
        }

        methods::handle(
            &event.request.method,
            &event.request.params,
            self.custodian.as_ref(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::CustodianError;
    use crate::error::ClientError;
    use crate::protocol::{
        ConnectParams, JSONRPC_VERSION, JsonRpcRequest, MemoryClientFactory, MemoryRelay, Metadata,
        Permissions,
    };
    use crate::transaction::TransactionRequest;

    struct NullCustodian;

    #[async_trait]
    impl KeyCustodian for NullCustodian {
        fn address(&self) -> String {
            "0x0000000000000000000000000000000000000001".to_string()
        }

        async fn chain_id(&self) -> Result<u64, CustodianError> {
            Ok(1)
        }

        async fn populate_transaction(
            &self,
            transaction: TransactionRequest,
        ) -> Result<TransactionRequest, CustodianError> {
            Ok(transaction)
        }

        async fn sign_transaction(&self, _: &TransactionRequest) -> Result<String, CustodianError> {
            Err(CustodianError::new(4200, "unsupported"))
        }

        async fn sign_message(&self, _: &str) -> Result<String, CustodianError> {
            Err(CustodianError::new(4200, "unsupported"))
        }
    }

    fn wallet() -> (Wallet, Arc<MemoryClientFactory>) {
        let factory = Arc::new(MemoryClientFactory::new(MemoryRelay::new()));
        let config = WalletConfig::default();
        let source = ClientSource::config(factory.clone(), config.client.clone());
        (Wallet::new(config, source, Arc::new(NullCustodian)), factory)
    }

    fn request_on(topic: &str, method: &str) -> RequestEvent {
        RequestEvent {
            topic: topic.to_string(),
            request: JsonRpcRequest {
                id: 1,
                jsonrpc: JSONRPC_VERSION.to_string(),
                method: method.to_string(),
                params: vec![json!(1)],
            },
        }
    }

    // ==================== Register Tests ====================

    #[tokio::test]
    async fn register_publishes_init_once() {
        let (wallet, factory) = wallet();
        wallet.register().await.unwrap();
        wallet.register().await.unwrap();

        assert_eq!(factory.init_count(), 1);
        let events = wallet.events().events_from(0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, BridgeEvent::Init);
    }

    #[tokio::test]
    async fn pair_with_unknown_uri_fails() {
        let (wallet, _) = wallet();
        let result = wallet.pair("wc:missing@2?relay-protocol=memory").await;
        assert!(matches!(result, Err(WalletError::Client(_))));
    }

    // ==================== Approval Tests ====================

    /// Propose a session from a bare client and wait for the wallet's answer
    async fn propose(
        wallet: &Wallet,
        factory: &MemoryClientFactory,
        chains: Vec<String>,
    ) -> Result<Session, ClientError> {
        let app = factory.relay().client("app");
        let mut app_rx = app.subscribe();
        let connecting = tokio::spawn({
            let app = app.clone();
            async move {
                app.connect(ConnectParams {
                    metadata: Metadata::default(),
                    permissions: Permissions::new(chains, vec!["personal_sign".to_string()]),
                })
                .await
            }
        });

        let uri = loop {
            if let ClientEvent::PairingProposed(p) = app_rx.recv().await.unwrap() {
                break p.uri;
            }
        };
        wallet.pair(&uri).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), connecting)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn approval_binds_caip10_account() {
        let (wallet, factory) = wallet();
        let session = propose(&wallet, &factory, vec!["eip155:7".to_string()])
            .await
            .unwrap();

        let account: AccountId = session.state.accounts[0].parse().unwrap();
        assert_eq!(account.chain().to_string(), "eip155:7");
        assert_eq!(account.address(), "0x0000000000000000000000000000000000000001");
    }

    #[tokio::test]
    async fn approval_without_chain_uses_custodian_chain() {
        let (wallet, factory) = wallet();
        let session = propose(&wallet, &factory, vec![]).await.unwrap();

        assert_eq!(
            session.state.accounts,
            vec!["eip155:1:0x0000000000000000000000000000000000000001".to_string()]
        );
    }

    #[tokio::test]
    async fn malformed_chain_is_rejected() {
        let (wallet, factory) = wallet();
        let result = propose(&wallet, &factory, vec!["eip155".to_string()]).await;

        assert!(matches!(
            result,
            Err(ClientError::Rejected { code, .. }) if code == UNSUPPORTED_CHAINS_CODE
        ));
        assert_eq!(factory.relay().session_count(), 0);
    }

    // ==================== Deletion Tests ====================

    #[tokio::test]
    async fn back_to_back_deletions_each_report_close_once() {
        let (wallet, factory) = wallet();
        let first = propose(&wallet, &factory, vec!["eip155:1".to_string()])
            .await
            .unwrap();
        let second = propose(&wallet, &factory, vec!["eip155:1".to_string()])
            .await
            .unwrap();
        let from = wallet.events().current_seq();

        // Both deletions land before the listener handles the first
        let app = factory.relay().client("app");
        app.disconnect(&first.topic, Reason::new(6000, "gone"))
            .await
            .unwrap();
        app.disconnect(&second.topic, Reason::new(6000, "gone"))
            .await
            .unwrap();

        let is_second = |e: &BridgeEvent| {
            matches!(e, BridgeEvent::Close { topic } if *topic == second.topic)
        };
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            wallet.events().wait_for(from, is_second),
        )
        .await
        .unwrap();

        let closes: Vec<_> = wallet
            .events()
            .events_from(from)
            .into_iter()
            .filter_map(|(_, e)| match e {
                BridgeEvent::Close { topic } => Some(topic),
                _ => None,
            })
            .collect();
        assert_eq!(closes, vec![first.topic, second.topic]);
    }

    #[tokio::test]
    async fn deletion_with_sessions_left_keeps_client() {
        let (wallet, factory) = wallet();
        let first = propose(&wallet, &factory, vec!["eip155:1".to_string()])
            .await
            .unwrap();
        propose(&wallet, &factory, vec!["eip155:1".to_string()])
            .await
            .unwrap();
        let from = wallet.events().current_seq();

        factory
            .relay()
            .client("app")
            .disconnect(&first.topic, Reason::new(6000, "gone"))
            .await
            .unwrap();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            wallet
                .events()
                .wait_for(from, |e| matches!(e, BridgeEvent::Close { .. })),
        )
        .await
        .unwrap();

        assert_eq!(wallet.sessions().await.unwrap().len(), 1);
        assert_eq!(factory.init_count(), 1);
    }

    // ==================== Dispatch Tests ====================

    #[tokio::test]
    async fn dispatch_on_unknown_topic_returns_error_response() {
        let (wallet, _) = wallet();
        let response = wallet
            .dispatch(request_on("nope", "oracle_data"))
            .await
            .unwrap();

        assert!(response.is_error());
        assert_eq!(response.id, 1);
        assert!(matches!(
            response.payload,
            crate::protocol::ResponsePayload::Error { ref error } if error.code == -32000
        ));
    }

    // ==================== Close Tests ====================

    #[tokio::test]
    async fn close_releases_client() {
        let (wallet, factory) = wallet();
        wallet.register().await.unwrap();

        wallet.close().await.unwrap();
        wallet.register().await.unwrap();

        assert_eq!(factory.init_count(), 2);
    }
}
