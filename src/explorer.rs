//! Client for the block explorer HTTP API.
//!
//! The explorer exposes transaction lists, internal transaction lists, contract
//! ABIs, verified source metadata and an `eth_getCode` proxy. List actions are
//! paginated with a fixed page size: a page holding exactly `page_size` rows
//! means another page should be requested, anything shorter ends the stream.

use std::future::Future;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::network::Network;

mod types;

pub use types::{
    AddressValidation, BlockRange, Envelope, RawInternalTransaction, RawSourceCode,
    RawTransaction, SourceMetadata,
};

/// Number of rows requested per page.
pub const PAGE_SIZE: usize = 200;

const UNVERIFIED_SOURCE: &str = "Contract source code not verified";

/// Errors surfaced by the explorer client.
#[derive(Debug, Error)]
pub enum ExplorerError {
    /// The request could not be sent or the server answered with an error status.
    #[error("Explorer request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The API answered, but flagged the call as failed.
    #[error("Explorer API error on '{action}': {reason}")]
    Api {
        /// Action that failed.
        action: String,
        /// Reason given by the API.
        reason: String,
    },
    /// The response body did not have the expected shape.
    #[error("Malformed explorer response on '{action}': {reason}")]
    MalformedResponse {
        /// Action whose response could not be parsed.
        action: String,
        /// Parse failure.
        reason: String,
    },
    /// The contract has no verified source on the explorer.
    #[error("Contract {0} has no verified source")]
    Unverified(String),
}

/// Operations the pipeline needs from a block explorer.
#[async_trait]
pub trait ExplorerApi: Send + Sync {
    /// Network this explorer serves.
    fn network(&self) -> Network;

    /// All external transactions addressed to `address` within `range`.
    async fn fetch_transactions(
        &self,
        address: &str,
        range: BlockRange,
    ) -> Result<Vec<RawTransaction>, ExplorerError>;

    /// All internal transactions involving `address` within `range`.
    async fn fetch_internal_transactions(
        &self,
        address: &str,
        range: BlockRange,
    ) -> Result<Vec<RawInternalTransaction>, ExplorerError>;

    /// Raw ABI JSON of a verified contract.
    async fn fetch_abi(&self, address: &str) -> Result<String, ExplorerError>;

    /// ABI and contract name of a verified contract.
    async fn fetch_source_metadata(&self, address: &str) -> Result<SourceMetadata, ExplorerError>;

    /// Timestamp of the earliest internal transaction involving `address`,
    /// taken as its creation time. `None` when it has no internal transactions.
    async fn fetch_creation_timestamp(&self, address: &str) -> Result<Option<u64>, ExplorerError>;

    /// Checks deployed bytecode. Empty bytecode means the address is not a contract.
    async fn validate_address(&self, address: &str) -> Result<AddressValidation, ExplorerError>;
}

/// Requests pages starting at 1 until a page comes back shorter than `page_size`.
///
/// This stops one request late when the total is an exact multiple of the page
/// size (the last request returns an empty page), and it trusts the upstream to
/// never return a short page in the middle of a stream.
pub async fn paginate<T, F, Fut>(page_size: usize, mut fetch_page: F) -> Result<Vec<T>, ExplorerError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, ExplorerError>>,
{
    let mut rows = Vec::new();
    let mut page = 1;
    loop {
        let batch = fetch_page(page).await?;
        let full_page = page_size > 0 && batch.len() == page_size;
        rows.extend(batch);
        if !full_page {
            break;
        }
        page += 1;
    }
    Ok(rows)
}

/// Etherscan compatible explorer client.
#[derive(Debug, Clone)]
pub struct EtherscanClient {
    http: reqwest::Client,
    network: Network,
    base_url: String,
    api_key: Option<String>,
    page_size: usize,
}

impl EtherscanClient {
    /// Creates a client for the given network's default endpoint.
    pub fn new(network: Network, api_key: Option<String>) -> Self {
        Self::with_base_url(network, network.api_url(), api_key)
    }

    /// Creates a client against a custom endpoint.
    pub fn with_base_url(network: Network, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            network,
            base_url: base_url.into(),
            api_key,
            page_size: PAGE_SIZE,
        }
    }

    /// Overrides the page size used for list actions.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    async fn request(
        &self,
        module: &str,
        action: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<Envelope, ExplorerError> {
        params.insert(0, ("module", module.to_string()));
        params.insert(1, ("action", action.to_string()));
        if let Some(key) = &self.api_key {
            params.push(("apikey", key.clone()));
        }

        let body = self
            .http
            .get(&self.base_url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        serde_json::from_str::<Envelope>(&body).map_err(|e| ExplorerError::MalformedResponse {
            action: action.to_string(),
            reason: e.to_string(),
        })
    }

    // Fails on NOTOK or an error member, otherwise hands back the result
    async fn request_result(
        &self,
        module: &str,
        action: &str,
        params: Vec<(&'static str, String)>,
    ) -> Result<serde_json::Value, ExplorerError> {
        let envelope = self.request(module, action, params).await?;
        if envelope.is_not_ok() || envelope.error.is_some() {
            return Err(ExplorerError::Api {
                action: action.to_string(),
                reason: envelope.failure_reason(),
            });
        }
        envelope.result.ok_or_else(|| ExplorerError::MalformedResponse {
            action: action.to_string(),
            reason: "missing result".to_string(),
        })
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        action: &str,
        address: &str,
        range: BlockRange,
        page: u32,
    ) -> Result<Vec<T>, ExplorerError> {
        let params = vec![
            ("address", address.to_string()),
            ("startblock", range.start_block().to_string()),
            ("endblock", range.end_block().to_string()),
            ("sort", "asc".to_string()),
            ("page", page.to_string()),
            ("offset", self.page_size.to_string()),
        ];
        let result = self.request_result("account", action, params).await?;
        let rows: Vec<T> = serde_json::from_value(result).map_err(|e| ExplorerError::MalformedResponse {
            action: action.to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(action, address, page, rows = rows.len(), "Fetched explorer page");
        Ok(rows)
    }
}

#[async_trait]
impl ExplorerApi for EtherscanClient {
    fn network(&self) -> Network {
        self.network
    }

    async fn fetch_transactions(
        &self,
        address: &str,
        range: BlockRange,
    ) -> Result<Vec<RawTransaction>, ExplorerError> {
        paginate(self.page_size, move |page| {
            self.fetch_page("txlist", address, range, page)
        })
        .await
    }

    async fn fetch_internal_transactions(
        &self,
        address: &str,
        range: BlockRange,
    ) -> Result<Vec<RawInternalTransaction>, ExplorerError> {
        paginate(self.page_size, move |page| {
            self.fetch_page("txlistinternal", address, range, page)
        })
        .await
    }

    async fn fetch_creation_timestamp(&self, address: &str) -> Result<Option<u64>, ExplorerError> {
        let rows: Vec<RawInternalTransaction> = self
            .fetch_page("txlistinternal", address, BlockRange::default(), 1)
            .await?;
        Ok(rows.first().and_then(|row| row.time_stamp.trim().parse().ok()))
    }

    async fn fetch_abi(&self, address: &str) -> Result<String, ExplorerError> {
        let result = self
            .request_result("contract", "getabi", vec![("address", address.to_string())])
            .await?;
        match result {
            serde_json::Value::String(abi) => Ok(abi),
            other => Err(ExplorerError::MalformedResponse {
                action: "getabi".to_string(),
                reason: format!("expected ABI string, got {}", other),
            }),
        }
    }

    async fn fetch_source_metadata(&self, address: &str) -> Result<SourceMetadata, ExplorerError> {
        let result = self
            .request_result("contract", "getsourcecode", vec![("address", address.to_string())])
            .await?;
        let sources: Vec<RawSourceCode> =
            serde_json::from_value(result).map_err(|e| ExplorerError::MalformedResponse {
                action: "getsourcecode".to_string(),
                reason: e.to_string(),
            })?;
        let source = sources.into_iter().next().ok_or_else(|| ExplorerError::MalformedResponse {
            action: "getsourcecode".to_string(),
            reason: "empty result".to_string(),
        })?;
        if source.abi.is_empty() || source.abi == UNVERIFIED_SOURCE {
            return Err(ExplorerError::Unverified(address.to_string()));
        }
        Ok(SourceMetadata {
            abi: source.abi,
            contract_name: source.contract_name,
        })
    }

    async fn validate_address(&self, address: &str) -> Result<AddressValidation, ExplorerError> {
        let envelope = self
            .request(
                "proxy",
                "eth_getCode",
                vec![("address", address.to_string()), ("tag", "latest".to_string())],
            )
            .await?;
        if envelope.is_not_ok() {
            return Err(ExplorerError::Api {
                action: "eth_getCode".to_string(),
                reason: envelope.failure_reason(),
            });
        }
        if envelope.error.is_some() {
            tracing::debug!(address, reason = %envelope.failure_reason(), "eth_getCode rejected address");
            return Ok(AddressValidation::rejected("Address specified is invalid"));
        }
        match envelope.result.as_ref().and_then(|r| r.as_str()) {
            Some(code) if code.trim_start_matches("0x").is_empty() => Ok(AddressValidation::rejected(
                "Address specified is for External Owned Account",
            )),
            Some(_) => Ok(AddressValidation::contract()),
            None => Err(ExplorerError::MalformedResponse {
                action: "eth_getCode".to_string(),
                reason: "missing bytecode result".to_string(),
            }),
        }
    }
}
