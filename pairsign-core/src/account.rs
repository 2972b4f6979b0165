//! Chain and account identifiers
//!
//! Chains are written `<namespace>:<reference>` (e.g. `eip155:1`) and
//! accounts `<namespace>:<reference>:<address>`. The address is always the
//! last colon-delimited segment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AccountIdError;

/// Default blockchain namespace
pub const DEFAULT_NAMESPACE: &str = "eip155";

/// A namespaced chain identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainId {
    namespace: String,
    reference: String,
}

impl ChainId {
    pub fn new(namespace: impl Into<String>, reference: impl fmt::Display) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl FromStr for ChainId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((namespace, reference))
                if !namespace.is_empty() && !reference.is_empty() && !reference.contains(':') =>
            {
                Ok(Self::new(namespace, reference))
            }
            _ => Err(AccountIdError::InvalidChain(s.to_string())),
        }
    }
}

impl TryFrom<String> for ChainId {
    type Error = AccountIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_string()
    }
}

/// An account bound to a chain
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId {
    chain: ChainId,
    address: String,
}

impl AccountId {
    pub fn new(chain: ChainId, address: impl Into<String>) -> Self {
        Self {
            chain,
            address: address.into(),
        }
    }

    pub fn chain(&self) -> &ChainId {
        &self.chain
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.address)
    }
}

impl FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AccountIdError::InvalidAccount(s.to_string());
        let (chain, address) = s.rsplit_once(':').ok_or_else(invalid)?;
        if address.is_empty() {
            return Err(invalid());
        }
        let chain = chain.parse().map_err(|_| invalid())?;
        Ok(Self::new(chain, address))
    }
}
