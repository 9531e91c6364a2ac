//! Wire types of the explorer API.

use serde::{Deserialize, Serialize};

/// Response envelope shared by every explorer endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    /// `"1"` on success. Absent on proxy responses.
    #[serde(default)]
    pub status: Option<String>,
    /// `"OK"`, `"NOTOK"` or a description.
    #[serde(default)]
    pub message: Option<String>,
    /// Payload, or the failure reason on NOTOK.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// JSON-RPC error member of proxy responses.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl Envelope {
    /// `message == "NOTOK"` flags an application level failure even on HTTP 200.
    pub fn is_not_ok(&self) -> bool {
        self.message.as_deref() == Some("NOTOK")
    }

    /// Human readable reason for a failed response.
    pub fn failure_reason(&self) -> String {
        if let Some(error) = &self.error {
            return match error {
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string()),
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        }
        match &self.result {
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => self.message.clone().unwrap_or_else(|| "unknown error".to_string()),
        }
    }
}

/// One row of the `txlist` action. Every field arrives as a string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTransaction {
    /// Block the transaction was mined in.
    pub block_number: String,
    /// Unix time of the block.
    pub time_stamp: String,
    /// Transaction hash.
    pub hash: String,
    /// Sender.
    pub from: String,
    /// Destination, empty for contract creations.
    pub to: String,
    /// Transferred wei.
    pub value: String,
    /// Gas limit.
    pub gas: String,
    /// Gas price in wei.
    pub gas_price: String,
    /// Gas consumed.
    pub gas_used: String,
    /// `"1"` when execution failed.
    pub is_error: String,
    /// Call-data as `0x` hex.
    pub input: String,
    /// Deployed contract, only set for creations.
    pub contract_address: String,
}

/// One row of the `txlistinternal` action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawInternalTransaction {
    /// Block the parent transaction was mined in.
    pub block_number: String,
    /// Unix time of the block.
    pub time_stamp: String,
    /// Hash of the parent transaction.
    pub hash: String,
    /// Caller.
    pub from: String,
    /// Callee, empty for creations.
    pub to: String,
    /// Transferred wei.
    pub value: String,
    /// Deployed contract, only set for creations.
    pub contract_address: String,
    /// Call-data as `0x` hex.
    pub input: String,
    /// `call`, `delegatecall`, `create` and so on.
    #[serde(rename = "type")]
    pub call_type: String,
    /// Gas limit.
    pub gas: String,
    /// Gas consumed.
    pub gas_used: String,
    /// `"1"` when the call failed.
    pub is_error: String,
}

/// One entry of the `getsourcecode` result array.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSourceCode {
    /// ABI JSON, or the unverified marker.
    #[serde(rename = "ABI")]
    pub abi: String,
    /// Name the contract was verified under.
    #[serde(rename = "ContractName")]
    pub contract_name: String,
}

/// ABI and name of a verified contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMetadata {
    /// Raw ABI JSON as returned by the explorer.
    pub abi: String,
    /// Contract name, may be empty.
    pub contract_name: String,
}

/// Outcome of probing an address for deployed bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressValidation {
    /// True if bytecode is deployed at the address.
    pub is_contract: bool,
    /// Reason the address was rejected.
    pub error: Option<String>,
}

impl AddressValidation {
    /// The address holds bytecode.
    pub fn contract() -> Self {
        Self { is_contract: true, error: None }
    }

    /// The address is unusable, for `reason`.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self { is_contract: false, error: Some(reason.into()) }
    }
}

/// Inclusive block range of a query. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockRange {
    /// First block, `None` for genesis.
    pub start: Option<u64>,
    /// Last block, `None` for the chain head.
    pub end: Option<u64>,
}

impl BlockRange {
    /// End block sent when the range is open.
    pub const UNBOUNDED_END: u64 = 99_999_999;

    /// Range between two optional bounds.
    pub fn new(start: Option<u64>, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Start block as sent to the explorer.
    pub fn start_block(&self) -> u64 {
        self.start.unwrap_or(0)
    }

    /// End block as sent to the explorer.
    pub fn end_block(&self) -> u64 {
        self.end.unwrap_or(Self::UNBOUNDED_END)
    }
}
