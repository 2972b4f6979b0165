//! Chain provider abstraction
//!
//! A chain provider tells the signer which chain it is talking to. The
//! signer only needs the numeric chain id.

use async_trait::async_trait;

use crate::error::ProviderError;

/// Source of the current chain id
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Numeric chain id of the connected network
    async fn chain_id(&self) -> Result<u64, ProviderError>;
}

/// Provider pinned to one chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticChainProvider {
    chain_id: u64,
}

impl StaticChainProvider {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }
}

#[async_trait]
impl ChainProvider for StaticChainProvider {
    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.chain_id)
    }
}
