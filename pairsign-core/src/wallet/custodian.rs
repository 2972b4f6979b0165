//! Key custodian abstraction
//!
//! The custodian holds the private key. The wallet never sees key material;
//! it asks the custodian to fill in, and sign, what the requester sent.

use async_trait::async_trait;

use crate::error::CustodianError;
use crate::transaction::TransactionRequest;

/// Holder of the wallet's signing key
#[async_trait]
pub trait KeyCustodian: Send + Sync {
    /// Address of the key, as bound into session accounts
    fn address(&self) -> String;

    /// Chain the custodian signs for
    async fn chain_id(&self) -> Result<u64, CustodianError>;

    /// Fill in fields the requester left out (nonce, gas, chain id)
    async fn populate_transaction(
        &self,
        transaction: TransactionRequest,
    ) -> Result<TransactionRequest, CustodianError>;

    /// Sign a fully populated transaction; returns it serialized
    async fn sign_transaction(
        &self,
        transaction: &TransactionRequest,
    ) -> Result<String, CustodianError>;

    /// Sign a message with the personal-message prefix
    async fn sign_message(&self, message: &str) -> Result<String, CustodianError>;
}
