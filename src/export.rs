//! CSV export of grouped transactions.
//!
//! Each alias group is split into chunks of [`CHUNK_SIZE`] rows, one file per
//! chunk. Every file carries the same header so features line up across the
//! whole export.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::pipeline::Grouping;
use crate::transaction_data::Transaction;
use crate::utils::{encode_hex_input, sanitize_file_component};

/// Maximum number of rows per file.
pub const CHUNK_SIZE: usize = 1000;

const FIXED_COLUMNS: [&str; 13] = [
    "hash",
    "address",
    "caller",
    "timestamp",
    "blockNumber",
    "gasUsed",
    "gasPrice",
    "gas",
    "alias",
    "internalCalls",
    "input",
    "method",
    "properties",
];

/// Failure to write one export chunk.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The CSV writer failed.
    #[error("Failed to write {path}: {source}")]
    Csv {
        /// File being written.
        path: String,
        /// Writer error.
        #[source]
        source: csv::Error,
    },
    /// The file system failed.
    #[error("Failed to prepare {path}: {source}")]
    Io {
        /// Path being prepared.
        path: String,
        /// File system error.
        #[source]
        source: std::io::Error,
    },
    /// A JSON cell could not be rendered.
    #[error("Failed to serialize column '{column}': {source}")]
    Json {
        /// Column being rendered.
        column: &'static str,
        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },
}

/// Block range an export is labelled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportRange {
    /// First block.
    pub start: u64,
    /// Last block.
    pub end: u64,
}

/// Outcome of an export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Files written, in write order.
    pub files: Vec<PathBuf>,
    /// Rows written across all files.
    pub rows: usize,
    /// Chunks that could not be written.
    pub failed: usize,
}

/// Destination of grouped transactions.
pub trait Exporter: Send + Sync {
    /// Writes every group. A failing chunk is reported in the summary and
    /// does not stop the remaining ones.
    fn export(&self, grouping: &Grouping, range: ExportRange) -> ExportSummary;
}

/// Writes CSV files into a directory.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    output_dir: PathBuf,
    chunk_size: usize,
}

impl CsvExporter {
    /// Exporter writing into `output_dir` in chunks of [`CHUNK_SIZE`] rows.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Overrides the number of rows per file. Zero is treated as one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn file_name(stem: &str, range: ExportRange, index: usize) -> String {
        format!("{}_{}-{}_{}.csv", stem, range.start, range.end, index)
    }

    fn write_chunk(&self, path: &Path, rows: &[Transaction], feature_columns: &[String]) -> Result<(), ExportError> {
        let path_label = path.display().to_string();
        let mut writer = csv::Writer::from_path(path).map_err(|source| ExportError::Csv {
            path: path_label.clone(),
            source,
        })?;

        let header = FIXED_COLUMNS
            .iter()
            .copied()
            .chain(feature_columns.iter().map(String::as_str));
        writer.write_record(header).map_err(|source| ExportError::Csv {
            path: path_label.clone(),
            source,
        })?;

        for tx in rows {
            let record = row(tx, feature_columns)?;
            writer.write_record(&record).map_err(|source| ExportError::Csv {
                path: path_label.clone(),
                source,
            })?;
        }

        writer.flush().map_err(|source| ExportError::Io {
            path: path_label,
            source,
        })
    }
}

impl Exporter for CsvExporter {
    fn export(&self, grouping: &Grouping, range: ExportRange) -> ExportSummary {
        let mut summary = ExportSummary::default();
        if grouping.is_empty() {
            tracing::info!("There are no transactions to export");
            return summary;
        }

        if let Err(source) = fs::create_dir_all(&self.output_dir) {
            let e = ExportError::Io {
                path: self.output_dir.display().to_string(),
                source,
            };
            tracing::error!(error = %e, "Cannot create output directory");
            summary.failed = grouping
                .groups
                .values()
                .map(|txs| txs.len().div_ceil(self.chunk_size))
                .sum();
            return summary;
        }

        let feature_columns = grouping.feature_columns.as_slice();
        let mut used_stems = HashSet::new();
        for (alias, transactions) in &grouping.groups {
            let stem = unique_stem(alias, &mut used_stems);
            for (index, chunk) in transactions.chunks(self.chunk_size).enumerate() {
                let path = self.output_dir.join(Self::file_name(&stem, range, index));
                match self.write_chunk(&path, chunk, feature_columns) {
                    Ok(()) => {
                        tracing::info!(file = %path.display(), rows = chunk.len(), "Chunk written");
                        summary.rows += chunk.len();
                        summary.files.push(path);
                    }
                    Err(e) => {
                        tracing::error!(file = %path.display(), error = %e, "Chunk export failed");
                        summary.failed += 1;
                    }
                }
            }
        }
        summary
    }
}

// Aliases that sanitize to a taken stem get a numeric suffix
fn unique_stem(alias: &str, used: &mut HashSet<String>) -> String {
    let base = sanitize_file_component(alias);
    let mut stem = base.clone();
    let mut suffix = 2;
    while !used.insert(stem.clone()) {
        stem = format!("{}_{}", base, suffix);
        suffix += 1;
    }
    if stem != base {
        tracing::warn!(alias, file_stem = %stem, "Alias collides with another group's file name");
    }
    stem
}

fn row(tx: &Transaction, feature_columns: &[String]) -> Result<Vec<String>, ExportError> {
    let internal_calls = serde_json::to_string(&tx.internal_calls).map_err(|source| ExportError::Json {
        column: "internalCalls",
        source,
    })?;
    let properties = match &tx.decoded {
        Some(decoded) => serde_json::to_string(&decoded.properties).map_err(|source| ExportError::Json {
            column: "properties",
            source,
        })?,
        None => String::new(),
    };

    let mut record = vec![
        tx.hash.clone(),
        tx.contract_address.clone(),
        tx.from.clone(),
        tx.timestamp.to_string(),
        tx.block_number.to_string(),
        tx.gas_used.to_string(),
        tx.gas_price.to_string(),
        tx.gas.to_string(),
        tx.alias().unwrap_or_default().to_string(),
        internal_calls,
        encode_hex_input(&tx.input),
        tx.method().to_string(),
        properties,
    ];

    let features = tx.decoded.as_ref().map(|d| d.features.as_slice()).unwrap_or_default();
    record.extend(feature_columns.iter().map(|column| {
        features
            .iter()
            .find(|feature| &feature.name == column)
            .map(|feature| feature.value.to_string())
            .unwrap_or_default()
    }));
    Ok(record)
}
