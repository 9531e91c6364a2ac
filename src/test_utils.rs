use async_trait::async_trait;
use ethabi::{Contract, Token};
use ethereum_types::{H160, U256};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::explorer::{
    AddressValidation, BlockRange, ExplorerApi, ExplorerError, RawInternalTransaction,
    RawTransaction, SourceMetadata,
};
use crate::network::Network;
use crate::transaction_data::{CallType, InternalCall, Transaction};

macro_rules! parameterize {
        ($test_fn:expr, [$(($name:ident, $input:expr)), * $(,)? ]) => {
            $(
                #[test]
                fn $name() {
                    $test_fn($input);
                }
            )*
        };
    }

pub(crate) use parameterize;

pub const ERC20_ABI: &str = r#"[
    {
        "type": "function",
        "name": "transfer",
        "stateMutability": "nonpayable",
        "inputs": [
            { "name": "to", "type": "address" },
            { "name": "value", "type": "uint256" }
        ],
        "outputs": [{ "name": "", "type": "bool" }]
    },
    {
        "type": "function",
        "name": "approve",
        "stateMutability": "nonpayable",
        "inputs": [
            { "name": "spender", "type": "address" },
            { "name": "value", "type": "uint256" }
        ],
        "outputs": [{ "name": "", "type": "bool" }]
    },
    {
        "type": "event",
        "name": "Transfer",
        "anonymous": false,
        "inputs": [
            { "name": "from", "type": "address", "indexed": true },
            { "name": "to", "type": "address", "indexed": true },
            { "name": "value", "type": "uint256", "indexed": false }
        ]
    }
]"#;

pub const REGISTRY_ABI: &str = r#"[
    {
        "type": "function",
        "name": "register",
        "stateMutability": "nonpayable",
        "inputs": [
            { "name": "amounts", "type": "uint256[]" },
            { "name": "labels", "type": "string[]" },
            { "name": "payload", "type": "bytes" },
            { "name": "note", "type": "string" }
        ],
        "outputs": []
    },
    {
        "type": "function",
        "name": "adjust",
        "stateMutability": "nonpayable",
        "inputs": [
            { "name": "deltas", "type": "int256[]" },
            { "name": "", "type": "bytes32" }
        ],
        "outputs": []
    }
]"#;

pub fn address_token_from_string(address: &str) -> Token {
    Token::Address(H160::from_str(address).unwrap())
}

pub fn uint_array(values: &[u64]) -> Token {
    Token::Array(values.iter().map(|v| Token::Uint(U256::from(*v))).collect())
}

pub fn string_array(values: &[&str]) -> Token {
    Token::Array(values.iter().map(|v| Token::String(v.to_string())).collect())
}

/// Call-data for `name` of the given ABI, selector included.
pub fn encode_call(abi: &str, name: &str, tokens: &[Token]) -> Vec<u8> {
    let contract: Contract = serde_json::from_str(abi).unwrap();
    contract.function(name).unwrap().encode_input(tokens).unwrap()
}

pub fn transfer_call() -> Vec<u8> {
    encode_call(
        ERC20_ABI,
        "transfer",
        &[
            address_token_from_string("0x7C07F7aBe10CE8e33DC6C5aD68FE033085256A84"),
            Token::Uint(U256::from(100)),
        ],
    )
}

pub fn transaction(hash: &str, to: &str, timestamp: u64) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        from: "0x1111111111111111111111111111111111111111".to_string(),
        to: to.to_string(),
        contract_address: to.to_string(),
        created_contract: None,
        is_contract_creation: false,
        input: Vec::new(),
        gas: 21_000,
        gas_used: 21_000,
        gas_price: 1_000_000_000,
        timestamp,
        block_number: timestamp,
        is_error: false,
        internal_calls: Vec::new(),
        decoded: None,
    }
}

pub fn internal_call(hash: &str, call_type: &str, from: &str, to: &str) -> InternalCall {
    InternalCall {
        hash: hash.to_string(),
        call_type: CallType::from(call_type),
        from: from.to_string(),
        to: to.to_string(),
        contract_address: None,
        input: Vec::new(),
        timestamp: 0,
        block_number: 0,
        is_error: false,
    }
}

/// In-memory explorer that counts the calls it receives.
#[derive(Default)]
pub struct FakeExplorer {
    pub transactions: HashMap<String, Vec<RawTransaction>>,
    pub internal_transactions: HashMap<String, Vec<RawInternalTransaction>>,
    pub sources: HashMap<String, SourceMetadata>,
    pub abis: HashMap<String, String>,
    pub bytecode: HashMap<String, String>,
    pub failing_transactions: bool,
    pub transaction_calls: AtomicUsize,
    pub source_calls: AtomicUsize,
    pub abi_calls: AtomicUsize,
    pub creation_calls: AtomicUsize,
}

impl FakeExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contract(mut self, address: &str) -> Self {
        self.bytecode.insert(address.to_string(), "0x6080604052".to_string());
        self
    }

    pub fn with_source(mut self, address: &str, name: &str, abi: &str) -> Self {
        self.sources.insert(
            address.to_string(),
            SourceMetadata {
                abi: abi.to_string(),
                contract_name: name.to_string(),
            },
        );
        self
    }

    pub fn fetches(&self) -> usize {
        self.source_calls.load(Ordering::SeqCst) + self.abi_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExplorerApi for FakeExplorer {
    fn network(&self) -> Network {
        Network::Mainnet
    }

    async fn fetch_transactions(
        &self,
        address: &str,
        _range: BlockRange,
    ) -> Result<Vec<RawTransaction>, ExplorerError> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_transactions {
            return Err(ExplorerError::Api {
                action: "txlist".to_string(),
                reason: "Max rate limit reached".to_string(),
            });
        }
        Ok(self.transactions.get(address).cloned().unwrap_or_default())
    }

    async fn fetch_internal_transactions(
        &self,
        address: &str,
        _range: BlockRange,
    ) -> Result<Vec<RawInternalTransaction>, ExplorerError> {
        Ok(self.internal_transactions.get(address).cloned().unwrap_or_default())
    }

    async fn fetch_creation_timestamp(&self, address: &str) -> Result<Option<u64>, ExplorerError> {
        self.creation_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .internal_transactions
            .get(address)
            .and_then(|rows| rows.first())
            .and_then(|row| row.time_stamp.parse().ok()))
    }

    async fn fetch_abi(&self, address: &str) -> Result<String, ExplorerError> {
        self.abi_calls.fetch_add(1, Ordering::SeqCst);
        self.abis.get(address).cloned().ok_or_else(|| ExplorerError::Api {
            action: "getabi".to_string(),
            reason: "Contract source code not verified".to_string(),
        })
    }

    async fn fetch_source_metadata(&self, address: &str) -> Result<SourceMetadata, ExplorerError> {
        self.source_calls.fetch_add(1, Ordering::SeqCst);
        self.sources
            .get(address)
            .cloned()
            .ok_or_else(|| ExplorerError::Unverified(address.to_string()))
    }

    async fn validate_address(&self, address: &str) -> Result<AddressValidation, ExplorerError> {
        match self.bytecode.get(address).map(String::as_str) {
            Some("0x") | None => Ok(AddressValidation::rejected(
                "Address specified is for External Owned Account",
            )),
            Some(_) => Ok(AddressValidation::contract()),
        }
    }
}
