//! Request method handlers
//!
//! Each supported JSON-RPC method maps to one handler. Handlers return the
//! JSON result or a [`DispatchError`]; turning that into a response is the
//! dispatcher's job.

use std::fmt;

use serde_json::Value;
use tracing::debug;

use super::custodian::KeyCustodian;
use crate::error::DispatchError;
use crate::transaction::TransactionRequest;

/// Methods the wallet answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletMethod {
    /// `eth_signTransaction`
    SignTransaction,
    /// `personal_sign`
    PersonalSign,
    /// `oracle_data`, a diagnostic echo method
    OracleData,
}

impl WalletMethod {
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "eth_signTransaction" => Some(Self::SignTransaction),
            "personal_sign" => Some(Self::PersonalSign),
            "oracle_data" => Some(Self::OracleData),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignTransaction => "eth_signTransaction",
            Self::PersonalSign => "personal_sign",
            Self::OracleData => "oracle_data",
        }
    }
}

impl fmt::Display for WalletMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run the handler for `method`
pub async fn handle(
    method: &str,
    params: &[Value],
    custodian: &dyn KeyCustodian,
) -> Result<Value, DispatchError> {
    let Some(known) = WalletMethod::parse(method) else {
        return Err(DispatchError::MethodNotImplemented(method.to_string()));
    };

    match known {
        WalletMethod::SignTransaction => sign_transaction(params, custodian).await,
        WalletMethod::PersonalSign => personal_sign(params, custodian).await,
        WalletMethod::OracleData => oracle_data(params),
    }
}

async fn sign_transaction(
    params: &[Value],
    custodian: &dyn KeyCustodian,
) -> Result<Value, DispatchError> {
    let method = WalletMethod::SignTransaction;
    let raw = first_param(method, params)?;
    let transaction =
        TransactionRequest::from_value(raw.clone()).map_err(|e| DispatchError::InvalidParams {
            method: method.to_string(),
            reason: e.to_string(),
        })?;

    let mut populated = custodian.populate_transaction(transaction).await?;
    populated.normalize_gas_fields()?;
    debug!(fields = populated.as_map().len(), "Transaction populated");

    let signed = custodian.sign_transaction(&populated).await?;
    Ok(Value::String(signed))
}

async fn personal_sign(
    params: &[Value],
    custodian: &dyn KeyCustodian,
) -> Result<Value, DispatchError> {
    let method = WalletMethod::PersonalSign;
    let message = first_param(method, params)?
        .as_str()
        .ok_or_else(|| DispatchError::InvalidParams {
            method: method.to_string(),
            reason: "message must be a string".to_string(),
        })?;

    let signature = custodian.sign_message(message).await?;
    Ok(Value::String(signature))
}

fn oracle_data(params: &[Value]) -> Result<Value, DispatchError> {
    let param = match first_param(WalletMethod::OracleData, params)? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(Value::String(format!("success{param}")))
}

fn first_param(method: WalletMethod, params: &[Value]) -> Result<&Value, DispatchError> {
    params.first().ok_or_else(|| DispatchError::InvalidParams {
        method: method.to_string(),
        reason: "missing first parameter".to_string(),
    })
}
