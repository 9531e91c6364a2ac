//! Maps contract addresses to ABI decoders.
//!
//! Supplied ABIs either name the address they belong to, or are left
//! unattached and tried against any address nothing else claims. Addresses
//! that are still unknown get their ABI fetched from the explorer. Every
//! successful resolution is memoized so an address is scanned or fetched once.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::decoder::{AbiDecoder, DecoderError};
use crate::explorer::{ExplorerApi, ExplorerError};
use crate::utils::normalize_address;

#[cfg(test)]
mod tests;

/// Errors raised while reading user supplied ABI material.
#[derive(Debug, Error)]
pub enum AbiMaterialError {
    /// The ABI file could not be read.
    #[error("Failed to read ABI file '{path}': {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// File system error.
        #[source]
        source: std::io::Error,
    },
    /// The ABI material is not JSON.
    #[error("ABI material is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The JSON has neither accepted shape.
    #[error("ABI material must be an ABI array or a list of {{address, alias, abi}} entries")]
    Shape,
}

/// One user supplied ABI, as written in the input file.
#[derive(Debug, Clone, Deserialize)]
pub struct AbiEntrySpec {
    /// Address the ABI belongs to. Unattached when absent.
    #[serde(default)]
    pub address: Option<String>,
    /// Group name for transactions decoded with this ABI.
    #[serde(default)]
    pub alias: Option<String>,
    /// ABI array, or a string holding one.
    pub abi: serde_json::Value,
}

/// User supplied ABI material.
#[derive(Debug, Clone)]
pub enum AbiMaterial {
    /// A bare ABI array, not bound to any address.
    Unattached(serde_json::Value),
    /// A list of entries, each optionally bound to an address.
    Entries(Vec<AbiEntrySpec>),
}

impl AbiMaterial {
    /// Parses ABI material from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, AbiMaterialError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Classifies an already parsed JSON document.
    pub fn from_value(value: serde_json::Value) -> Result<Self, AbiMaterialError> {
        match value {
            serde_json::Value::Array(items) if items.iter().all(is_entry) => {
                let entries = items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<AbiEntrySpec>, _>>()?;
                Ok(AbiMaterial::Entries(entries))
            }
            serde_json::Value::Array(items) => Ok(AbiMaterial::Unattached(serde_json::Value::Array(items))),
            object @ serde_json::Value::Object(_) if is_entry(&object) => {
                Ok(AbiMaterial::Entries(vec![serde_json::from_value(object)?]))
            }
            _ => Err(AbiMaterialError::Shape),
        }
    }

    /// The material as a list of entries. A bare ABI becomes one unattached entry.
    pub fn into_entries(self) -> Vec<AbiEntrySpec> {
        match self {
            AbiMaterial::Unattached(abi) => vec![AbiEntrySpec {
                address: None,
                alias: None,
                abi,
            }],
            AbiMaterial::Entries(entries) => entries,
        }
    }
}

fn is_entry(value: &serde_json::Value) -> bool {
    value.as_object().map(|o| o.contains_key("abi")).unwrap_or(false)
}

/// An ABI with its decoder. A `None` decoder never matches anything.
#[derive(Debug, Clone)]
pub struct AbiEntry {
    /// Normalized address, `None` for unattached entries.
    pub address: Option<String>,
    /// Alias, if one was supplied or fetched.
    pub alias: Option<String>,
    /// Decoder built from the ABI.
    pub decoder: Option<Arc<AbiDecoder>>,
}

impl AbiEntry {
    /// Builds the decoder eagerly. A construction failure is logged and the
    /// entry is kept without a decoder.
    pub fn from_spec(spec: AbiEntrySpec) -> Self {
        let address = spec
            .address
            .as_deref()
            .map(normalize_address)
            .filter(|a| !a.is_empty());
        let decoder = match AbiDecoder::from_value(&spec.abi) {
            Ok(decoder) => {
                tracing::debug!(
                    address = address.as_deref().unwrap_or("unattached"),
                    functions = decoder.function_count(),
                    "Input data decoder created"
                );
                Some(Arc::new(decoder))
            }
            Err(e) => {
                tracing::error!(
                    address = address.as_deref().unwrap_or("unattached"),
                    alias = spec.alias.as_deref().unwrap_or_default(),
                    error = %e,
                    "Failed to create input data decoder"
                );
                None
            }
        };
        Self {
            address,
            alias: spec.alias.filter(|a| !a.is_empty()),
            decoder,
        }
    }
}

/// Where a resolved decoder came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Address keyed entry, supplied or memoized earlier.
    Known,
    /// First unattached ABI that decoded one of the samples.
    Fallback,
    /// Fetched from the explorer.
    Fetched,
}

/// A decoder resolved for one address.
#[derive(Debug, Clone)]
pub struct ResolvedDecoder {
    /// Normalized address.
    pub address: String,
    /// Alias, or the address when there is none.
    pub alias: String,
    /// Decoder to use for the address.
    pub decoder: Arc<AbiDecoder>,
    /// How the decoder was found.
    pub source: ResolutionSource,
}

/// Failure to find a decoder for an address.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The address has a supplied ABI, but its decoder could not be built.
    #[error("ABI supplied for {address} could not be turned into a decoder")]
    NoDecoder {
        /// Address being resolved.
        address: String,
    },
    /// The explorer did not provide an ABI.
    #[error("Failed to get ABI of {address}: {source}")]
    Fetch {
        /// Address being resolved.
        address: String,
        /// Explorer error of the last lookup.
        #[source]
        source: ExplorerError,
    },
    /// The explorer returned an ABI that does not parse.
    #[error("ABI fetched for {address} is invalid: {source}")]
    InvalidAbi {
        /// Address being resolved.
        address: String,
        /// Parse error.
        #[source]
        source: DecoderError,
    },
}

/// Address keyed decoders plus an ordered list of unattached fallbacks.
pub struct DecoderRegistry {
    by_address: RwLock<HashMap<String, Arc<AbiEntry>>>,
    unattached: Vec<Arc<AbiEntry>>,
    explorer: Arc<dyn ExplorerApi>,
}

impl DecoderRegistry {
    /// Partitions supplied entries into address keyed and unattached buckets.
    pub fn build(entries: Vec<AbiEntrySpec>, explorer: Arc<dyn ExplorerApi>) -> Self {
        let mut by_address = HashMap::new();
        let mut unattached = Vec::new();

        for spec in entries {
            let entry = Arc::new(AbiEntry::from_spec(spec));
            match entry.address.clone() {
                Some(address) => {
                    if by_address.insert(address.clone(), entry).is_some() {
                        tracing::warn!(address, "Duplicate ABI entry, the later one wins");
                    }
                }
                None => unattached.push(entry),
            }
        }

        tracing::info!(
            known = by_address.len(),
            unattached = unattached.len(),
            network = %explorer.network(),
            "Decoder registry built"
        );
        Self {
            by_address: RwLock::new(by_address),
            unattached,
            explorer,
        }
    }

    /// Number of address keyed entries, memoized ones included.
    pub async fn known_addresses(&self) -> usize {
        self.by_address.read().await.len()
    }

    /// Finds a decoder for `address`.
    ///
    /// Tries, in order: the address keyed entry, every unattached ABI against
    /// `samples` (call-data of transactions sent to the address), and an
    /// explorer fetch. An unattached ABI matches when it decodes any sample.
    /// Fallback and fetch results are memoized.
    pub async fn resolve(&self, address: &str, samples: &[Vec<u8>]) -> Result<ResolvedDecoder, ResolveError> {
        let address = normalize_address(address);

        let known = self.by_address.read().await.get(&address).cloned();
        if let Some(entry) = known {
            return resolved_from(&address, &entry, ResolutionSource::Known)
                .ok_or(ResolveError::NoDecoder { address });
        }

        if let Some(entry) = self.match_unattached(samples) {
            let memo = AbiEntry {
                address: Some(address.clone()),
                alias: entry.alias.clone(),
                decoder: entry.decoder.clone(),
            };
            let stored = self.memoize(&address, memo).await;
            tracing::debug!(address, "Unattached ABI matched");
            return resolved_from(&address, &stored, ResolutionSource::Fallback)
                .ok_or(ResolveError::NoDecoder { address });
        }

        let (decoder, alias) = self.fetch(&address).await?;
        let memo = AbiEntry {
            address: Some(address.clone()),
            alias,
            decoder: Some(Arc::new(decoder)),
        };
        let stored = self.memoize(&address, memo).await;
        tracing::debug!(address, "Fetched ABI from explorer");
        resolved_from(&address, &stored, ResolutionSource::Fetched).ok_or(ResolveError::NoDecoder { address })
    }

    /// Resolves many addresses with at most `concurrency` in flight. Every
    /// address gets its own outcome, one failure never stops the others.
    pub async fn resolve_all(
        &self,
        requests: Vec<(String, Vec<Vec<u8>>)>,
        concurrency: usize,
    ) -> HashMap<String, Result<ResolvedDecoder, ResolveError>> {
        stream::iter(requests)
            .map(|(address, samples)| async move {
                let result = self.resolve(&address, &samples).await;
                if let Err(e) = &result {
                    tracing::warn!(address, error = %e, "Could not resolve a decoder");
                }
                (normalize_address(&address), result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }

    fn match_unattached(&self, samples: &[Vec<u8>]) -> Option<&Arc<AbiEntry>> {
        self.unattached.iter().find(|entry| {
            entry
                .decoder
                .as_ref()
                .map(|decoder| samples.iter().any(|sample| decoder.decode(sample).is_match()))
                .unwrap_or(false)
        })
    }

    async fn fetch(&self, address: &str) -> Result<(AbiDecoder, Option<String>), ResolveError> {
        match self.explorer.fetch_source_metadata(address).await {
            Ok(metadata) => match AbiDecoder::from_json(&metadata.abi) {
                Ok(decoder) => {
                    let alias = Some(metadata.contract_name).filter(|name| !name.is_empty());
                    return Ok((decoder, alias));
                }
                Err(e) => {
                    tracing::warn!(address, error = %e, "Verified source carries an unreadable ABI");
                }
            },
            Err(e) => {
                tracing::debug!(address, error = %e, "Source metadata unavailable, falling back to getabi");
            }
        }

        let abi = self
            .explorer
            .fetch_abi(address)
            .await
            .map_err(|source| ResolveError::Fetch {
                address: address.to_string(),
                source,
            })?;
        let decoder = AbiDecoder::from_json(&abi).map_err(|source| ResolveError::InvalidAbi {
            address: address.to_string(),
            source,
        })?;
        Ok((decoder, None))
    }

    // Concurrent resolutions of one address produce equivalent entries, the
    // first one stored is kept
    async fn memoize(&self, address: &str, entry: AbiEntry) -> Arc<AbiEntry> {
        let mut by_address = self.by_address.write().await;
        by_address
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(entry))
            .clone()
    }
}

fn resolved_from(address: &str, entry: &AbiEntry, source: ResolutionSource) -> Option<ResolvedDecoder> {
    let decoder = entry.decoder.clone()?;
    Some(ResolvedDecoder {
        address: address.to_string(),
        alias: entry.alias.clone().unwrap_or_else(|| address.to_string()),
        decoder,
        source,
    })
}
