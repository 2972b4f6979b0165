//! Shared test utilities for pairsign-core integration tests

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pairsign_core::{
    BridgeEvent, ClientSource, CustodianError, EventBridge, EventSeq, KeyCustodian,
    MemoryClientFactory, MemoryRelay, Signer, SignerConfig, TransactionRequest, Wallet,
    WalletConfig,
};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

pub const CHAIN_ID: u64 = 123;
pub const WALLET_ADDRESS: &str = "0xaaE062157B53077da1414ec3579b4CBdF7a4116f";

/// How long any single wait in a test may take
pub const WAIT: Duration = Duration::from_secs(5);

/// Install a test subscriber; honours RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Custodian with a fixed address that signs deterministically
pub struct FakeCustodian {
    chain_id: u64,
    failure: Option<CustodianError>,
    signed: Mutex<Vec<TransactionRequest>>,
    messages: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeCustodian {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            failure: None,
            signed: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Custodian whose signing calls all fail with `code`/`message`
    pub fn failing(chain_id: u64, code: i64, message: &str) -> Self {
        Self {
            failure: Some(CustodianError::new(code, message)),
            ..Self::new(chain_id)
        }
    }

    pub fn signed(&self) -> Vec<TransactionRequest> {
        self.signed.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyCustodian for FakeCustodian {
    fn address(&self) -> String {
        WALLET_ADDRESS.to_string()
    }

    async fn chain_id(&self) -> Result<u64, CustodianError> {
        Ok(self.chain_id)
    }

    async fn populate_transaction(
        &self,
        mut transaction: TransactionRequest,
    ) -> Result<TransactionRequest, CustodianError> {
        for (field, value) in [("gasLimit", 21000u64), ("gasPrice", 1_000_000_000), ("nonce", 0)] {
            if !transaction.contains(field) {
                transaction.set(field, value);
            }
        }
        transaction.set("chainId", self.chain_id);
        transaction.set("from", WALLET_ADDRESS);
        Ok(transaction)
    }

    async fn sign_transaction(
        &self,
        transaction: &TransactionRequest,
    ) -> Result<String, CustodianError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        let mut signed = self.signed.lock().unwrap();
        signed.push(transaction.clone());
        Ok(format!("0xsigned{}", signed.len()))
    }

    async fn sign_message(&self, message: &str) -> Result<String, CustodianError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        self.messages.lock().unwrap().push(message.to_string());
        Ok(format!("0xsig:{message}"))
    }
}

/// A signer and a wallet sharing one in-memory relay
pub struct Harness {
    pub relay: Arc<MemoryRelay>,
    pub factory: Arc<MemoryClientFactory>,
    pub custodian: Arc<FakeCustodian>,
    pub signer: Signer,
    pub wallet: Wallet,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_custodian(FakeCustodian::new(CHAIN_ID))
    }

    pub fn with_custodian(custodian: FakeCustodian) -> Self {
        init_tracing();
        let relay = MemoryRelay::new();
        let factory = Arc::new(MemoryClientFactory::new(Arc::clone(&relay)));
        let custodian = Arc::new(custodian);

        let signer = signer_on(&factory, signer_config());
        let wallet_config = WalletConfig::default();
        let wallet = Wallet::new(
            wallet_config.clone(),
            ClientSource::config(factory.clone(), wallet_config.client),
            custodian.clone(),
        );

        Self {
            relay,
            factory,
            custodian,
            signer,
            wallet,
        }
    }

    /// Another signer with the harness signer's client identity
    pub fn sibling_signer(&self, config: SignerConfig) -> Signer {
        signer_on(&self.factory, config)
    }
}

/// Requester config used by the harness
pub fn signer_config() -> SignerConfig {
    let mut config = SignerConfig::with_chain_id(CHAIN_ID);
    config.methods.push("oracle_data".to_string());
    config.client.name = Some("app".to_string());
    config.debug = true;
    config
}

pub fn signer_on(factory: &Arc<MemoryClientFactory>, config: SignerConfig) -> Signer {
    let source = ClientSource::config(factory.clone(), config.client.clone());
    Signer::new(config, source)
}

/// Forward every URI the signer publishes to the wallet
pub fn auto_pair(signer: &Signer, wallet: &Wallet) -> JoinHandle<()> {
    let mut events = signer.subscribe();
    let wallet = wallet.clone();
    tokio::spawn(async move {
        while let Ok((_, event)) = events.recv().await {
            if let BridgeEvent::Uri { uri } = event
                && let Err(e) = wallet.pair(&uri).await
            {
                tracing::debug!(error = %e, "Pairing attempt failed");
            }
        }
    })
}

/// Await `future`, failing the test if it takes longer than [`WAIT`]
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out waiting")
}

/// Wait for the first event at or after `from` matching `predicate`
pub async fn wait_for<F>(bridge: &EventBridge, from: EventSeq, predicate: F) -> BridgeEvent
where
    F: Fn(&BridgeEvent) -> bool,
{
    within(bridge.wait_for(from, predicate)).await.1
}

/// Events published on `bridge` from `from` onwards
pub fn events_since(bridge: &EventBridge, from: EventSeq) -> Vec<BridgeEvent> {
    bridge
        .events_from(from)
        .into_iter()
        .map(|(_, event)| event)
        .collect()
}

/// Number of events from `from` onwards matching `predicate`
#[allow(dead_code)]
pub fn count<F>(bridge: &EventBridge, from: EventSeq, predicate: F) -> usize
where
    F: Fn(&BridgeEvent) -> bool,
{
    events_since(bridge, from)
        .iter()
        .filter(|event| predicate(event))
        .count()
}
