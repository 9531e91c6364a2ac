//! Export the transactions of a smart contract as decoded, featurized CSV
//!
//! This crate pulls a contract's external and internal transactions from an
//! Etherscan compatible explorer, merges them, resolves an ABI for every
//! destination contract (supplied ABIs first, explorer lookups second), decodes
//! the call-data, derives per-argument summary features and writes the result
//! as CSV files grouped by contract alias.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use contract_tx_export::{run, CsvExporter, EtherscanClient, Network, RunOptions};
//! tokio_test::block_on(async {
//!     let explorer = Arc::new(EtherscanClient::new(Network::Mainnet, None));
//!     let mut options = RunOptions::new("0xdAC17F958D2ee523a2206206994597C13D831ec7", Network::Mainnet);
//!     options.output_dir = "out".into();
//!
//!     let summary = run(explorer, options, &CsvExporter::new("out")).await.unwrap();
//!     println!("{} transactions in {} groups", summary.transactions, summary.groups.len());
//! })
//! ```
//!
//! The [`pipeline`] module exposes every stage on its own for callers that
//! want to stop before the export.
#![warn(missing_docs)]

pub mod config;
pub mod decoder;
pub mod explorer;
pub mod export;
pub mod features;
pub mod merger;
pub mod network;
pub mod pipeline;
pub mod registry;
#[cfg(test)]
mod test_utils;
pub mod transaction_data;
pub mod utils;

pub use config::{load_abi_material, RunOptions, DEFAULT_CONCURRENCY};
pub use decoder::{AbiDecoder, DecodedResult};
pub use explorer::{BlockRange, EtherscanClient, ExplorerApi, ExplorerError};
pub use export::{CsvExporter, ExportRange, ExportSummary, Exporter};
pub use features::{derive_features, Feature, FeatureKind, FeatureValue, OrderedSet};
pub use network::Network;
pub use pipeline::{run, Grouping, PipelineError, RunSummary, UNIDENTIFIED};
pub use registry::{AbiMaterial, DecoderRegistry, ResolveError};
pub use transaction_data::{CallType, DecodedCall, InternalCall, Transaction};
