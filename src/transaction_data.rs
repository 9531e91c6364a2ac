//! Typed transactions and internal calls built from explorer rows.

use serde::Serialize;

use crate::decoder::DecodedResult;
use crate::explorer::{RawInternalTransaction, RawTransaction};
use crate::features::Feature;
use crate::utils::{decode_hex_input, normalize_address};

/// Kind of an internal call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    /// Plain message call.
    Call,
    /// Call running the callee's code in the caller's context.
    DelegateCall,
    /// Read-only call.
    StaticCall,
    /// Contract deployment.
    Create,
    /// Contract deployment at a salted address.
    Create2,
    /// Any other type reported by the explorer.
    #[serde(untagged)]
    Other(String),
}

impl From<&str> for CallType {
    fn from(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "call" => CallType::Call,
            "delegatecall" => CallType::DelegateCall,
            "staticcall" => CallType::StaticCall,
            "create" => CallType::Create,
            "create2" => CallType::Create2,
            other => CallType::Other(other.to_string()),
        }
    }
}

impl CallType {
    /// Whether the call deployed a contract.
    pub fn is_create(&self) -> bool {
        matches!(self, CallType::Create | CallType::Create2)
    }
}

/// A sub-call made during the execution of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalCall {
    /// Hash of the parent transaction.
    pub hash: String,
    /// Kind of call.
    pub call_type: CallType,
    /// Caller.
    pub from: String,
    /// Callee, empty for creations.
    pub to: String,
    /// Address of the created contract, only set for create calls.
    pub contract_address: Option<String>,
    /// Call-data.
    #[serde(skip)]
    pub input: Vec<u8>,
    /// Unix time of the block.
    pub timestamp: u64,
    /// Block of the parent transaction.
    pub block_number: u64,
    /// Whether the call failed.
    #[serde(skip)]
    pub is_error: bool,
}

impl From<RawInternalTransaction> for InternalCall {
    fn from(raw: RawInternalTransaction) -> Self {
        let contract_address = non_empty_address(&raw.contract_address);
        Self {
            hash: raw.hash.to_lowercase(),
            call_type: CallType::from(raw.call_type.as_str()),
            from: normalize_address(&raw.from),
            to: normalize_address(&raw.to),
            contract_address,
            input: parse_input(&raw.input, &raw.hash),
            timestamp: parse_number(&raw.time_stamp),
            block_number: parse_number(&raw.block_number),
            is_error: raw.is_error == "1",
        }
    }
}

/// Outcome of decoding a transaction against its contract's ABI.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCall {
    /// Alias of the contract whose ABI decoded the call.
    pub alias: String,
    /// Method label, possibly synthesized for contract creations.
    pub method: String,
    /// Raw decoder output.
    pub result: DecodedResult,
    /// Argument name to rendered value, later names overwrite earlier ones.
    pub properties: serde_json::Map<String, serde_json::Value>,
    /// Derived features, unique by name.
    pub features: Vec<Feature>,
}

/// An on-chain transaction addressed to the tracked contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Transaction hash.
    pub hash: String,
    /// Sender.
    pub from: String,
    /// Nominal destination as submitted.
    pub to: String,
    /// Contract that actually received the call, set by the merger.
    pub contract_address: String,
    /// Contract deployed by this transaction, if any.
    pub created_contract: Option<String>,
    /// Whether the transaction deployed `created_contract`.
    pub is_contract_creation: bool,
    /// Call-data.
    pub input: Vec<u8>,
    /// Gas limit.
    pub gas: u64,
    /// Gas consumed.
    pub gas_used: u64,
    /// Gas price in wei.
    pub gas_price: u128,
    /// Unix time of the block.
    pub timestamp: u64,
    /// Block the transaction was mined in.
    pub block_number: u64,
    /// Whether execution failed.
    pub is_error: bool,
    /// Internal calls made by the transaction.
    pub internal_calls: Vec<InternalCall>,
    /// Decoding outcome, `None` when no decoder recognised the call.
    pub decoded: Option<DecodedCall>,
}

impl From<RawTransaction> for Transaction {
    fn from(raw: RawTransaction) -> Self {
        let to = normalize_address(&raw.to);
        Self {
            hash: raw.hash.to_lowercase(),
            from: normalize_address(&raw.from),
            contract_address: to.clone(),
            to,
            created_contract: non_empty_address(&raw.contract_address),
            is_contract_creation: false,
            input: parse_input(&raw.input, &raw.hash),
            gas: parse_number(&raw.gas),
            gas_used: parse_number(&raw.gas_used),
            gas_price: raw.gas_price.trim().parse().unwrap_or_default(),
            timestamp: parse_number(&raw.time_stamp),
            block_number: parse_number(&raw.block_number),
            is_error: raw.is_error == "1",
            internal_calls: Vec::new(),
            decoded: None,
        }
    }
}

impl Transaction {
    /// Alias the transaction is grouped under, if it was decoded.
    pub fn alias(&self) -> Option<&str> {
        self.decoded.as_ref().map(|d| d.alias.as_str())
    }

    /// Method label, empty when undecoded.
    pub fn method(&self) -> &str {
        self.decoded.as_ref().map(|d| d.method.as_str()).unwrap_or_default()
    }
}

fn parse_number(value: &str) -> u64 {
    value.trim().parse().unwrap_or_default()
}

fn non_empty_address(value: &str) -> Option<String> {
    let address = normalize_address(value);
    if address.is_empty() {
        None
    } else {
        Some(address)
    }
}

fn parse_input(input: &str, hash: &str) -> Vec<u8> {
    match decode_hex_input(input) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(hash, error = %e, "Transaction input is not valid hex, treating it as empty");
            Vec::new()
        }
    }
}
