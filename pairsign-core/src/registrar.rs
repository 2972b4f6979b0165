//! Lazy client registrar
//!
//! Holds at most one initialized session client handle per owner and makes
//! concurrent `register()` calls share a single initialization. The
//! initialization runs in its own task, so a caller that stops waiting does
//! not cancel it.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RegistrarError;
use crate::protocol::{ClientConfig, ClientFactory, SessionClient};

/// Hook that attaches an owner's event handlers to a fresh handle
///
/// Runs exactly once per handle, before any caller can observe it. The
/// token is cancelled when the handle is released. The hook must not call
/// back into the registrar.
pub type WireFn = Arc<dyn Fn(Arc<dyn SessionClient>, CancellationToken) + Send + Sync>;

type InitOutcome = Option<Result<Arc<dyn SessionClient>, RegistrarError>>;

/// Where a registrar gets its client handle from
#[derive(Clone)]
pub enum ClientSource {
    /// Build a new handle from configuration
    Config {
        factory: Arc<dyn ClientFactory>,
        config: ClientConfig,
    },
    /// Adopt an already-initialized handle
    Live(Arc<dyn SessionClient>),
}

impl ClientSource {
    pub fn config(factory: Arc<dyn ClientFactory>, config: ClientConfig) -> Self {
        Self::Config { factory, config }
    }

    pub fn live(client: Arc<dyn SessionClient>) -> Self {
        Self::Live(client)
    }

    async fn produce(&self) -> Result<Arc<dyn SessionClient>, RegistrarError> {
        match self {
            Self::Config { factory, config } => factory
                .init(config)
                .await
                .map_err(|e| RegistrarError::InitFailed(e.to_string())),
            Self::Live(client) => Ok(Arc::clone(client)),
        }
    }
}

enum RegistrarState {
    Idle,
    Initializing(watch::Receiver<InitOutcome>),
    Ready {
        client: Arc<dyn SessionClient>,
        shutdown: CancellationToken,
    },
}

/// Single-flight owner of a session client handle
pub struct ClientRegistrar {
    source: ClientSource,
    wire: WireFn,
    state: Arc<Mutex<RegistrarState>>,
}

impl ClientRegistrar {
    pub fn new(source: ClientSource, wire: WireFn) -> Self {
        Self {
            source,
            wire,
            state: Arc::new(Mutex::new(RegistrarState::Idle)),
        }
    }

    pub fn source(&self) -> &ClientSource {
        &self.source
    }

    fn lock(&self) -> MutexGuard<'_, RegistrarState> {
        lock_state(&self.state)
    }

    /// Return the handle, initializing it first if needed
    pub async fn register(&self) -> Result<Arc<dyn SessionClient>, RegistrarError> {
        let mut rx = {
            let mut state = self.lock();
            match &*state {
                RegistrarState::Ready { client, .. } => return Ok(Arc::clone(client)),
                RegistrarState::Initializing(rx) => rx.clone(),
                RegistrarState::Idle => {
                    let (tx, rx) = watch::channel(None);
                    *state = RegistrarState::Initializing(rx.clone());
                    self.spawn_init(tx);
                    rx
                }
            }
        };

        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| RegistrarError::NotInitialized)?;
        match &*outcome {
            Some(result) => result.clone(),
            None => Err(RegistrarError::NotInitialized),
        }
    }

    fn spawn_init(&self, tx: watch::Sender<InitOutcome>) {
        let source = self.source.clone();
        let wire = Arc::clone(&self.wire);
        let guard = InitGuard {
            state: Arc::clone(&self.state),
            tx: Some(tx),
        };

        tokio::spawn(async move {
            let result = source.produce().await;

            {
                let mut state = lock_state(&guard.state);
                match &result {
                    Ok(client) => {
                        let shutdown = CancellationToken::new();
                        wire(Arc::clone(client), shutdown.clone());
                        *state = RegistrarState::Ready {
                            client: Arc::clone(client),
                            shutdown,
                        };
                        debug!(client = client.context(), "Session client registered");
                    }
                    Err(e) => {
                        *state = RegistrarState::Idle;
                        warn!(error = %e, "Session client initialization failed");
                    }
                }
            }

            guard.complete(result);
        });
    }

    /// Release the current handle; the next `register()` starts over
    ///
    /// An initialization already in flight is left to finish.
    pub fn reset(&self) {
        let mut state = self.lock();
        if let RegistrarState::Ready { shutdown, client } = &*state {
            debug!(client = client.context(), "Session client released");
            shutdown.cancel();
            *state = RegistrarState::Idle;
        }
    }

    /// Current handle, without initializing
    pub fn client(&self) -> Option<Arc<dyn SessionClient>> {
        match &*self.lock() {
            RegistrarState::Ready { client, .. } => Some(Arc::clone(client)),
            _ => None,
        }
    }

    pub fn is_initializing(&self) -> bool {
        matches!(&*self.lock(), RegistrarState::Initializing(_))
    }
}

/// Settles one initialization
///
/// If the init task ends without an outcome (the factory or the wire hook
/// panicked), dropping the guard returns the registrar to `Idle` and fails
/// the waiters, so the next `register()` starts over.
struct InitGuard {
    state: Arc<Mutex<RegistrarState>>,
    tx: Option<watch::Sender<InitOutcome>>,
}

impl InitGuard {
    fn complete(mut self, outcome: Result<Arc<dyn SessionClient>, RegistrarError>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(outcome));
        }
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        let Some(tx) = self.tx.take() else { return };
        {
            let mut state = lock_state(&self.state);
            if matches!(&*state, RegistrarState::Initializing(_)) {
                *state = RegistrarState::Idle;
            }
        }
        warn!("Session client initialization aborted");
        let _ = tx.send(Some(Err(RegistrarError::InitFailed(
            "initialization aborted".to_string(),
        ))));
    }
}

fn lock_state(state: &Mutex<RegistrarState>) -> MutexGuard<'_, RegistrarState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
