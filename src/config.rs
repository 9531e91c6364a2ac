//! Options bundle consumed by the pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use crate::explorer::BlockRange;
use crate::network::Network;
use crate::registry::{AbiMaterial, AbiMaterialError};

/// Default number of decoder fetches in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Everything one run needs to know.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Contract whose transactions are exported.
    pub address: String,
    /// Network the explorer client is bound to.
    pub network: Network,
    /// Block range of the ingestion.
    pub range: BlockRange,
    /// Also ingest contracts created by the target's internal calls.
    pub recursive: bool,
    /// Keep transactions and internal calls flagged as failed.
    pub include_failed: bool,
    /// User supplied ABIs.
    pub abi: Option<AbiMaterial>,
    /// Directory the export files are written to.
    pub output_dir: PathBuf,
    /// Upper bound on concurrent explorer lookups.
    pub concurrency: usize,
    /// Add the creation time of contracts passed as address arguments.
    pub trace: bool,
}

impl RunOptions {
    /// Options for `address` on `network` with every other setting at its default.
    pub fn new(address: impl Into<String>, network: Network) -> Self {
        Self {
            address: address.into(),
            network,
            range: BlockRange::default(),
            recursive: false,
            include_failed: false,
            abi: None,
            output_dir: PathBuf::from("."),
            concurrency: DEFAULT_CONCURRENCY,
            trace: false,
        }
    }
}

/// Loads ABI material from a file path, or reads it inline when `source`
/// already is a JSON document.
pub fn load_abi_material(source: &str) -> Result<AbiMaterial, AbiMaterialError> {
    let trimmed = source.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        return AbiMaterial::from_json(trimmed);
    }
    read_abi_file(Path::new(source))
}

fn read_abi_file(path: &Path) -> Result<AbiMaterial, AbiMaterialError> {
    let content = fs::read_to_string(path).map_err(|source| AbiMaterialError::Io {
        path: path.display().to_string(),
        source,
    })?;
    tracing::debug!(path = %path.display(), bytes = content.len(), "Read ABI file");
    AbiMaterial::from_json(&content)
}
