//! Transaction requests and gas field normalization
//!
//! A transaction request is kept as a JSON object so fields the core does
//! not know about pass through untouched. Only the gas fields are rewritten,
//! into JSON-RPC quantity form (`0x` + minimal lowercase hex).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TransactionError;

/// Fields rewritten by [`TransactionRequest::normalize_gas_fields`]
pub const GAS_FIELDS: [&str; 2] = ["gasLimit", "gasPrice"];

/// A transaction as exchanged with the custodian and over the session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRequest(Map<String, Value>);

impl TransactionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self, TransactionError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(TransactionError::NotAnObject),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Rewrite present gas fields as hex quantities
    ///
    /// Absent and null fields are left alone. Numbers, decimal strings and
    /// hex strings are accepted.
    pub fn normalize_gas_fields(&mut self) -> Result<(), TransactionError> {
        for field in GAS_FIELDS {
            if let Some(value) = self.0.get_mut(field)
                && !value.is_null()
            {
                *value = Value::String(to_hex_quantity(field, value)?);
            }
        }
        Ok(())
    }
}

impl From<TransactionRequest> for Value {
    fn from(tx: TransactionRequest) -> Self {
        tx.into_value()
    }
}

/// Encode a numeric JSON value as a JSON-RPC quantity
pub fn to_hex_quantity(field: &str, value: &Value) -> Result<String, TransactionError> {
    let invalid = || TransactionError::InvalidQuantity {
        field: field.to_string(),
        value: value.to_string(),
    };

    let number = match value {
        Value::Number(n) => n.as_u64().map(u128::from).ok_or_else(invalid)?,
        Value::String(s) => parse_quantity(s.trim()).ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };
    Ok(format!("{number:#x}"))
}

fn parse_quantity(s: &str) -> Option<u128> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some("") => None,
        Some(hex) => u128::from_str_radix(hex, 16).ok(),
        None if s.is_empty() => None,
        None => s.parse().ok(),
    }
}
