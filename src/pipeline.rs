//! Ingestion, decoding and grouping of a contract's transactions.
//!
//! A run validates the target, fetches and merges its transaction streams,
//! resolves a decoder for every destination, decodes and featurizes each
//! transaction, sorts them by time and groups them by contract alias. All
//! intermediate data lives in a [`PipelineState`] built fresh for every run.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use thiserror::Error;

use crate::config::RunOptions;
use crate::decoder::token_to_json;
use crate::explorer::{BlockRange, ExplorerApi, ExplorerError};
use crate::export::{ExportRange, ExportSummary, Exporter};
use crate::features::{address_arguments, creation_time_feature, derive_features, OrderedSet};
use crate::merger::{created_contracts, merge};
use crate::registry::{AbiMaterial, DecoderRegistry, ResolvedDecoder};
use crate::transaction_data::{DecodedCall, InternalCall, Transaction};
use crate::utils::{is_valid_address, normalize_address};

/// Group name of transactions no decoder could make sense of.
pub const UNIDENTIFIED: &str = "unidentified";

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The target address is empty.
    #[error("Smart contract address is not specified")]
    MissingAddress,
    /// The target is malformed or not a contract.
    #[error("Error validating contract address {address}: {reason}")]
    InvalidAddress {
        /// Normalized target address.
        address: String,
        /// Why the address was rejected.
        reason: String,
    },
    /// Fetching the target's transactions failed.
    #[error(transparent)]
    Explorer(#[from] ExplorerError),
}

/// Transactions grouped by alias, plus the feature columns seen across all of them.
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    /// Transactions per alias, in timestamp order.
    pub groups: BTreeMap<String, Vec<Transaction>>,
    /// Every feature name seen across the run.
    pub feature_columns: OrderedSet<String>,
}

impl Grouping {
    /// Number of transactions across all groups.
    pub fn transaction_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Whether no group holds a transaction.
    pub fn is_empty(&self) -> bool {
        self.transaction_count() == 0
    }

    /// Highest block number across all groups.
    pub fn max_block(&self) -> Option<u64> {
        self.groups.values().flatten().map(|tx| tx.block_number).max()
    }
}

/// State owned by a single run.
#[derive(Debug)]
pub struct PipelineState {
    /// Options of the run, address normalized.
    pub options: RunOptions,
    /// Merged transactions awaiting decoding.
    pub transactions: Vec<Transaction>,
    /// Result of decoding and grouping.
    pub grouping: Grouping,
    visited: HashSet<String>,
}

impl PipelineState {
    /// Fresh state for a run with `options`.
    pub fn new(mut options: RunOptions) -> Self {
        options.address = normalize_address(&options.address);
        Self {
            options,
            transactions: Vec::new(),
            grouping: Grouping::default(),
            visited: HashSet::new(),
        }
    }

    /// Block range the export is labelled with. An open end becomes the
    /// highest block among the exported transactions.
    pub fn export_range(&self) -> ExportRange {
        ExportRange {
            start: self.options.range.start_block(),
            end: self
                .options
                .range
                .end
                .or_else(|| self.grouping.max_block())
                .unwrap_or(0),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Number of exported transactions.
    pub transactions: usize,
    /// Alias and size of every group.
    pub groups: Vec<(String, usize)>,
    /// What the exporter wrote.
    pub export: ExportSummary,
}

/// Runs the whole pipeline for `options.address`.
pub async fn run(
    explorer: Arc<dyn ExplorerApi>,
    options: RunOptions,
    exporter: &dyn Exporter,
) -> Result<RunSummary, PipelineError> {
    let mut state = PipelineState::new(options);

    validate_target(explorer.as_ref(), &state.options.address).await?;
    ingest(explorer.as_ref(), &mut state).await?;
    tracing::info!(transactions = state.transactions.len(), "Transactions fetched and merged");

    let entries = state
        .options
        .abi
        .clone()
        .map(AbiMaterial::into_entries)
        .unwrap_or_default();
    let registry = DecoderRegistry::build(entries, Arc::clone(&explorer));

    let transactions = std::mem::take(&mut state.transactions);
    state.grouping = decode_and_featurize(transactions, &registry, state.options.concurrency).await;
    if state.options.trace {
        trace_creation_times(&mut state.grouping, explorer.as_ref(), state.options.concurrency).await;
    }

    let groups: Vec<(String, usize)> = state
        .grouping
        .groups
        .iter()
        .map(|(alias, txs)| (alias.clone(), txs.len()))
        .collect();
    for (alias, count) in &groups {
        tracing::info!(alias, transactions = count, "Group ready");
    }

    let export = exporter.export(&state.grouping, state.export_range());
    Ok(RunSummary {
        transactions: state.grouping.transaction_count(),
        groups,
        export,
    })
}

/// Rejects malformed addresses and addresses without bytecode.
pub async fn validate_target(explorer: &dyn ExplorerApi, address: &str) -> Result<(), PipelineError> {
    if address.is_empty() {
        return Err(PipelineError::MissingAddress);
    }
    if !is_valid_address(address) {
        return Err(PipelineError::InvalidAddress {
            address: address.to_string(),
            reason: "Address specified is invalid".to_string(),
        });
    }
    let validation = explorer.validate_address(address).await?;
    if !validation.is_contract {
        return Err(PipelineError::InvalidAddress {
            address: address.to_string(),
            reason: validation
                .error
                .unwrap_or_else(|| "Address specified is not a contract".to_string()),
        });
    }
    Ok(())
}

/// Fetches the target's transactions and, when recursive, those of every
/// contract it created. Transactions are de-duplicated by hash.
pub async fn ingest(explorer: &dyn ExplorerApi, state: &mut PipelineState) -> Result<(), PipelineError> {
    let mut queue = VecDeque::new();
    let target = state.options.address.clone();
    state.visited.insert(target.clone());
    queue.push_back(target);

    let mut seen_hashes: HashSet<String> = state.transactions.iter().map(|tx| tx.hash.clone()).collect();

    while let Some(address) = queue.pop_front() {
        let transactions = fetch_contract(
            explorer,
            &address,
            state.options.range,
            state.options.include_failed,
        )
        .await?;
        tracing::info!(address, transactions = transactions.len(), "Contract ingested");

        if state.options.recursive {
            for created in created_contracts(&transactions) {
                if state.visited.insert(created.clone()) {
                    tracing::debug!(parent = address, created, "Queued created contract");
                    queue.push_back(created);
                }
            }
        }

        for tx in transactions {
            if seen_hashes.insert(tx.hash.clone()) {
                state.transactions.push(tx);
            }
        }
    }
    Ok(())
}

/// Fetches both streams of one contract concurrently and merges them.
pub async fn fetch_contract(
    explorer: &dyn ExplorerApi,
    address: &str,
    range: BlockRange,
    include_failed: bool,
) -> Result<Vec<Transaction>, ExplorerError> {
    let (raw_transactions, raw_internal) = tokio::try_join!(
        explorer.fetch_transactions(address, range),
        explorer.fetch_internal_transactions(address, range),
    )?;

    let transactions: Vec<Transaction> = raw_transactions
        .into_iter()
        .map(Transaction::from)
        .filter(|tx| include_failed || !tx.is_error)
        .collect();
    let internal_calls: Vec<InternalCall> = raw_internal
        .into_iter()
        .map(InternalCall::from)
        .filter(|call| include_failed || !call.is_error)
        .collect();

    Ok(merge(transactions, internal_calls))
}

/// Decodes every transaction, derives its features, sorts by timestamp and
/// groups by alias.
///
/// Decoders are resolved once per distinct destination. Every distinct call
/// sent there is offered as a sample. Transactions whose destination does not
/// resolve pass through undecoded.
pub async fn decode_and_featurize(
    mut transactions: Vec<Transaction>,
    registry: &DecoderRegistry,
    concurrency: usize,
) -> Grouping {
    let resolved = registry.resolve_all(resolution_requests(&transactions), concurrency).await;

    for tx in transactions.iter_mut() {
        if let Some(Ok(decoder)) = resolved.get(&tx.contract_address) {
            decode_transaction(tx, decoder);
        }
    }

    sort_by_timestamp(&mut transactions);
    group_by_alias(transactions)
}

/// One request per distinct destination, in first-seen order. Samples are the
/// distinct call-data sent there, creations and empty inputs excluded since
/// no ABI function decodes them.
pub fn resolution_requests(transactions: &[Transaction]) -> Vec<(String, Vec<Vec<u8>>)> {
    let mut order = Vec::new();
    let mut samples: HashMap<&str, (HashSet<&[u8]>, Vec<Vec<u8>>)> = HashMap::new();

    for tx in transactions.iter().filter(|tx| !tx.contract_address.is_empty()) {
        let (seen, inputs) = samples.entry(tx.contract_address.as_str()).or_insert_with(|| {
            order.push(tx.contract_address.clone());
            (HashSet::new(), Vec::new())
        });
        if !tx.is_contract_creation && tx.input.len() >= 4 && seen.insert(tx.input.as_slice()) {
            inputs.push(tx.input.clone());
        }
    }

    order
        .into_iter()
        .map(|address| {
            let inputs = samples.remove(address.as_str()).map(|(_, inputs)| inputs).unwrap_or_default();
            (address, inputs)
        })
        .collect()
}

/// Decodes one transaction in place. Leaves it undecoded when the ABI does not
/// recognise the call, unless it is a contract creation.
pub fn decode_transaction(tx: &mut Transaction, resolved: &ResolvedDecoder) {
    let result = resolved.decoder.decode(&tx.input);
    let method = match &result.method {
        Some(method) => method.clone(),
        None if tx.is_contract_creation => format!("Contract creation: {}", resolved.alias),
        None => {
            tracing::debug!(hash = %tx.hash, alias = %resolved.alias, "Call not recognised by ABI");
            return;
        }
    };

    let mut properties = serde_json::Map::new();
    for (name, value) in result.names.iter().zip(&result.inputs) {
        properties.insert(name.clone(), token_to_json(value));
    }
    let features = derive_features(&result);

    tx.decoded = Some(DecodedCall {
        alias: resolved.alias.clone(),
        method,
        result,
        properties,
        features,
    });
}

/// Adds a `{argument}_timeStamp` feature to every decoded call whose address
/// argument names a contract with a known creation time.
///
/// Each distinct address is looked up once. Lookup failures are logged and the
/// feature is left out for that address.
pub async fn trace_creation_times(grouping: &mut Grouping, explorer: &dyn ExplorerApi, concurrency: usize) {
    let addresses: OrderedSet<String> = grouping
        .groups
        .values()
        .flatten()
        .filter_map(|tx| tx.decoded.as_ref())
        .flat_map(|decoded| address_arguments(&decoded.result))
        .map(|(_, address)| address)
        .collect();
    if addresses.is_empty() {
        return;
    }

    let created: HashMap<String, u64> = stream::iter(addresses.iter().cloned())
        .map(|address| async move {
            match explorer.fetch_creation_timestamp(&address).await {
                Ok(timestamp) => timestamp.map(|timestamp| (address, timestamp)),
                Err(e) => {
                    tracing::warn!(address, error = %e, "Could not get contract creation time");
                    None
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter_map(futures::future::ready)
        .collect()
        .await;
    tracing::info!(addresses = addresses.len(), found = created.len(), "Creation times traced");

    for tx in grouping.groups.values_mut().flatten() {
        let Some(decoded) = tx.decoded.as_mut() else {
            continue;
        };
        for (argument, address) in address_arguments(&decoded.result) {
            let Some(timestamp) = created.get(&address) else {
                continue;
            };
            let feature = creation_time_feature(&argument, *timestamp);
            if decoded.features.iter().all(|f| f.name != feature.name) {
                grouping.feature_columns.insert(feature.name.clone());
                decoded.features.push(feature);
            }
        }
    }
}

/// Stable sort on timestamp, equal timestamps keep their input order.
pub fn sort_by_timestamp(transactions: &mut [Transaction]) {
    transactions.sort_by_key(|tx| tx.timestamp);
}

/// Groups transactions by alias, undecoded ones under [`UNIDENTIFIED`].
/// Order within a group is the input order.
pub fn group_by_alias(transactions: Vec<Transaction>) -> Grouping {
    let mut grouping = Grouping::default();
    for tx in transactions {
        if let Some(decoded) = &tx.decoded {
            grouping
                .feature_columns
                .extend(decoded.features.iter().map(|f| f.name.clone()));
        }
        let alias = tx.alias().unwrap_or(UNIDENTIFIED).to_string();
        grouping.groups.entry(alias).or_default().push(tx);
    }
    grouping
}
