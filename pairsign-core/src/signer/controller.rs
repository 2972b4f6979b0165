//! Signer: requester-side session controller
//!
//! A Signer opens (or reuses) a session with a remote wallet and forwards
//! signing requests over it. The session protocol client is registered
//! lazily; its events are translated into [`BridgeEvent`]s by a listener
//! task that lives as long as the client handle.
//!
//! `open()` is not cancelable: it runs in a spawned task, so dropping the
//! caller's future leaves the handshake running, and its outcome still
//! lands in the signer's state.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::provider::ChainProvider;
use super::state::{ConnectionState, SignerState};
use crate::account::{AccountId, ChainId};
use crate::config::SignerConfig;
use crate::error::SignerError;
use crate::events::{BridgeEvent, EventBridge, EventSeq};
use crate::matcher::{OpenPlan, plan_open};
use crate::protocol::{
    ClientEvent, ConnectParams, Permissions, Reason, RequestArguments, Session, SessionClient,
};
use crate::registrar::{ClientRegistrar, ClientSource, WireFn};
use crate::transaction::TransactionRequest;

/// Reason code sent when the signer closes its session
pub const CLOSE_REASON_CODE: i64 = 123;

/// Reason message sent when the signer closes its session
pub const CLOSE_REASON_MESSAGE: &str = "Signer closed.";

/// Options for [`Signer::open_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Only adopt an existing session; never start a handshake
    pub only_reconnect: bool,
}

impl OpenOptions {
    pub fn reconnect() -> Self {
        Self {
            only_reconnect: true,
        }
    }
}

struct SignerInner {
    config: SignerConfig,
    source: ClientSource,
    provider: Option<Arc<dyn ChainProvider>>,
    registrar: ClientRegistrar,
    bridge: EventBridge,
    state: Mutex<SignerState>,
    open_lock: Arc<tokio::sync::Mutex<()>>,
}

/// Requester-side session controller
///
/// Cloning a Signer yields another handle to the same instance. Use
/// [`Signer::connect`] for an independent instance.
#[derive(Clone)]
pub struct Signer {
    inner: Arc<SignerInner>,
}

impl Signer {
    /// Create a signer without a chain provider
    pub fn new(config: SignerConfig, source: ClientSource) -> Self {
        Self::build(config, source, None)
    }

    /// Create a signer bound to a chain provider
    pub fn with_provider(
        config: SignerConfig,
        source: ClientSource,
        provider: Arc<dyn ChainProvider>,
    ) -> Self {
        Self::build(config, source, Some(provider))
    }

    fn build(
        config: SignerConfig,
        source: ClientSource,
        provider: Option<Arc<dyn ChainProvider>>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<SignerInner>| {
            let weak = weak.clone();
            let wire: WireFn = Arc::new(move |client, shutdown| {
                if let Some(inner) = weak.upgrade() {
                    inner.attach(client, shutdown);
                }
            });

            SignerInner {
                registrar: ClientRegistrar::new(source.clone(), wire),
                config,
                source,
                provider,
                bridge: EventBridge::default(),
                state: Mutex::new(SignerState::default()),
                open_lock: Arc::new(tokio::sync::Mutex::new(())),
            }
        });

        Self { inner }
    }

    /// New independent signer with the same configuration, bound to `provider`
    pub fn connect(&self, provider: Arc<dyn ChainProvider>) -> Signer {
        Self::build(
            self.inner.config.clone(),
            self.inner.source.clone(),
            Some(provider),
        )
    }

    pub fn config(&self) -> &SignerConfig {
        &self.inner.config
    }

    /// Whether a session is active
    pub fn connected(&self) -> bool {
        self.inner.lock_state().session().is_some()
    }

    /// Whether an open is in progress
    pub fn connecting(&self) -> bool {
        self.inner.lock_state().is_pending()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.lock_state().connection_state()
    }

    /// Snapshot of the active session
    pub fn session(&self) -> Option<Session> {
        self.inner.lock_state().session().cloned()
    }

    /// Snapshot of the cached accounts
    pub fn accounts(&self) -> Option<Vec<String>> {
        self.inner.lock_state().accounts().map(<[String]>::to_vec)
    }

    /// Subscribe to lifecycle events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<(EventSeq, BridgeEvent)> {
        self.inner.bridge.subscribe()
    }

    /// Event bridge, for replay and waiting
    pub fn events(&self) -> &EventBridge {
        &self.inner.bridge
    }

    /// Open a session, creating one if none can be reused
    pub async fn open(&self) -> Result<(), SignerError> {
        self.open_with(OpenOptions::default()).await
    }

    /// Open a session
    ///
    /// Opens are serialized; a second open waits for the first and then
    /// reuses its session.
    pub async fn open_with(&self, options: OpenOptions) -> Result<(), SignerError> {
        let inner = Arc::clone(&self.inner);
        let open_lock = Arc::clone(&self.inner.open_lock);

        tokio::spawn(async move {
            let _guard = open_lock.lock_owned().await;
            inner.open(options).await
        })
        .await
        .map_err(|e| SignerError::OpenAborted(e.to_string()))?
    }

    /// Disconnect the active session
    ///
    /// Returns once the client reports the session deleted. Without an
    /// active session this does nothing.
    pub async fn close(&self) -> Result<(), SignerError> {
        let Some(topic) = self.inner.active_topic() else {
            debug!("Close requested without an active session");
            return Ok(());
        };

        // No handle means the deletion was already seen and the handle released
        let Some(client) = self.inner.registrar.client() else {
            self.inner.on_close(&topic);
            return Ok(());
        };
        let mut events = client.subscribe();

        info!(topic = %topic, "Closing session");
        client
            .disconnect(
                &topic,
                Reason::new(CLOSE_REASON_CODE, CLOSE_REASON_MESSAGE),
            )
            .await?;

        wait_for_deletion(client.as_ref(), &mut events, &topic).await;
        self.inner.on_close(&topic);
        Ok(())
    }

    /// Address of the first account bound to the session
    pub fn address(&self) -> Result<String, SignerError> {
        let state = self.inner.lock_state();
        let first = state
            .accounts()
            .and_then(<[String]>::first)
            .ok_or(SignerError::NotEnabled)?;
        let account: AccountId = first.parse()?;
        Ok(account.address().to_string())
    }

    /// Ask the wallet to sign a message with `personal_sign`
    pub async fn sign_message(&self, message: &str) -> Result<String, SignerError> {
        let (client, session) = self.ensure_session().await?;
        let address = self.address()?;
        let result = self
            .inner
            .send(
                client.as_ref(),
                &session.topic,
                RequestArguments::new("personal_sign", vec![json!(message), json!(address)]),
            )
            .await?;
        expect_string("personal_sign", result)
    }

    /// Ask the wallet to sign a transaction; returns it serialized
    pub async fn sign_transaction(
        &self,
        mut transaction: TransactionRequest,
    ) -> Result<String, SignerError> {
        transaction.normalize_gas_fields()?;
        let (client, session) = self.ensure_session().await?;
        let result = self
            .inner
            .send(
                client.as_ref(),
                &session.topic,
                RequestArguments::new("eth_signTransaction", vec![transaction.into_value()]),
            )
            .await?;
        expect_string("eth_signTransaction", result)
    }

    /// Forward an arbitrary JSON-RPC method over the session
    pub async fn request(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<Value, SignerError> {
        let (client, session) = self.ensure_session().await?;
        self.inner
            .send(
                client.as_ref(),
                &session.topic,
                RequestArguments::new(method, params),
            )
            .await
    }

    async fn ensure_session(&self) -> Result<(Arc<dyn SessionClient>, Session), SignerError> {
        self.inner.registrar.register().await?;
        if !self.connected() {
            self.open().await?;
        }
        let client = self.inner.registrar.register().await?;
        let session = self.session().ok_or(SignerError::MissingSession)?;
        Ok((client, session))
    }
}

impl SignerInner {
    fn lock_state(&self) -> MutexGuard<'_, SignerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn active_topic(&self) -> Option<String> {
        self.lock_state().active_topic().map(str::to_string)
    }

    /// Start the listener for a freshly registered client
    fn attach(self: Arc<Self>, client: Arc<dyn SessionClient>, shutdown: CancellationToken) {
        let mut events = client.subscribe();
        let weak = Arc::downgrade(&self);
        let context = client.context().to_string();

        tokio::spawn(async move {
            debug!(client = %context, "Signer listening");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) => {
                            let Some(inner) = weak.upgrade() else { break };
                            inner.handle_client_event(event);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(client = %context, skipped, "Signer listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!(client = %context, "Signer listener stopped");
        });

        self.bridge.publish(BridgeEvent::Init);
    }

    fn handle_client_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::PairingProposed(proposal) => {
                debug!(topic = %proposal.topic, "Pairing URI ready");
                self.bridge.publish(BridgeEvent::Uri { uri: proposal.uri });
            }
            ClientEvent::SessionUpdated(session) => {
                let mut state = self.lock_state();
                if state.refresh_if_active(&session) {
                    debug!(topic = %session.topic, "Session updated");
                    self.bridge.publish(BridgeEvent::StatusUpdate { session });
                } else {
                    debug!(topic = %session.topic, "Ignoring update for inactive session");
                }
            }
            ClientEvent::SessionCreated(session) => {
                if !self.lock_state().refresh_if_active(&session) {
                    debug!(topic = %session.topic, "Session created");
                }
            }
            ClientEvent::SessionDeleted(session) => {
                if self.on_close(&session.topic) {
                    info!(topic = %session.topic, "Session deleted");
                } else {
                    debug!(topic = %session.topic, "Ignoring deletion of inactive session");
                }
            }
            other => trace!(event = other.name(), "Ignoring client event"),
        }
    }

    async fn open(&self, options: OpenOptions) -> Result<(), SignerError> {
        self.lock_state().set_pending(true);
        let result = self.open_session(options).await;
        self.lock_state().set_pending(false);
        result
    }

    async fn open_session(&self, options: OpenOptions) -> Result<(), SignerError> {
        let client = self.registrar.register().await?;
        let chain = ChainId::new(&self.config.namespace, self.resolve_chain_id().await?);
        let permissions = Permissions::new(vec![chain.to_string()], self.config.methods.clone());

        let sessions = client.sessions().await;
        match plan_open(&sessions, &permissions, options.only_reconnect) {
            OpenPlan::Reuse(session) => {
                info!(topic = %session.topic, chain = %chain, "Reusing session");
                self.adopt(session, true);
            }
            OpenPlan::Create => {
                info!(chain = %chain, "Requesting new session");
                let session = client
                    .connect(ConnectParams {
                        metadata: self.config.client.metadata.clone(),
                        permissions,
                    })
                    .await?;
                info!(topic = %session.topic, "Session established");
                self.adopt(session, false);
            }
            OpenPlan::Skip => {
                debug!(chain = %chain, "No session to reconnect to");
            }
        }
        Ok(())
    }

    async fn resolve_chain_id(&self) -> Result<u64, SignerError> {
        if let Some(provider) = &self.provider {
            match provider.chain_id().await {
                Ok(chain_id) => return Ok(chain_id),
                Err(e) => warn!(error = %e, "Chain provider could not report a chain id"),
            }
        }
        self.config.chain_id.ok_or(SignerError::MissingChainId)
    }

    fn adopt(&self, session: Session, reused: bool) {
        let mut state = self.lock_state();
        state.apply(session.clone());
        if reused {
            self.bridge.publish(BridgeEvent::StatusUpdate {
                session: session.clone(),
            });
        }
        self.bridge.publish(BridgeEvent::Open { session });
    }

    /// Clear local state after the session on `topic` ended
    ///
    /// Emits `Close` at most once per session, whichever path sees the
    /// deletion first. Returns false if `topic` was not the active session.
    fn on_close(&self, topic: &str) -> bool {
        let mut state = self.lock_state();
        if state.active_topic() != Some(topic) {
            return false;
        }
        let Some(session) = state.take_session() else {
            return false;
        };
        self.registrar.reset();
        self.bridge.publish(BridgeEvent::Close {
            topic: session.topic,
        });
        true
    }

    async fn send(
        &self,
        client: &dyn SessionClient,
        topic: &str,
        request: RequestArguments,
    ) -> Result<Value, SignerError> {
        let method = request.method.clone();
        debug!(topic = %topic, method = %method, "Sending request");
        if self.config.debug {
            debug!(method = %method, params = ?request.params, "Request payload");
        }

        let result = client.request(topic, request).await?;

        if self.config.debug {
            debug!(method = %method, result = %result, "Response payload");
        }
        Ok(result)
    }
}

async fn wait_for_deletion(
    client: &dyn SessionClient,
    events: &mut broadcast::Receiver<ClientEvent>,
    topic: &str,
) {
    loop {
        match events.recv().await {
            Ok(ClientEvent::SessionDeleted(session)) if session.topic == topic => return,
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => {
                if !client.sessions().await.iter().any(|s| s.topic == topic) {
                    return;
                }
            }
            Err(RecvError::Closed) => return,
        }
    }
}

fn expect_string(method: &str, value: Value) -> Result<String, SignerError> {
    match value {
        Value::String(s) => Ok(s),
        value => Err(SignerError::UnexpectedResult {
            method: method.to_string(),
            value,
        }),
    }
}
