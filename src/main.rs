use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use contract_tx_export::{
    load_abi_material, run, BlockRange, CsvExporter, EtherscanClient, ExplorerApi, Network, RunOptions,
    DEFAULT_CONCURRENCY,
};
use eyre::WrapErr;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Export a contract's decoded transactions as CSV
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address of the smart contract
    address: String,

    /// First block to include
    #[arg(short = 's', long = "startblock")]
    start_block: Option<u64>,

    /// Last block to include
    #[arg(short = 'e', long = "endblock")]
    end_block: Option<u64>,

    /// Network the contract lives on
    #[arg(short = 'n', long = "net", value_enum, default_value_t = Network::Mainnet)]
    network: Network,

    /// ABI file, or an inline ABI / entry list
    #[arg(short = 'a', long)]
    abi: Option<String>,

    /// Output directory
    #[arg(short = 'p', long = "path", default_value = ".")]
    output_dir: PathBuf,

    /// Also export contracts created by the target
    #[arg(short = 'r', long)]
    recursive: bool,

    /// Keep failed transactions and internal calls
    #[arg(long)]
    include_failed: bool,

    /// Add the creation time of contracts passed as address arguments
    #[arg(short = 't', long)]
    trace: bool,

    /// Maximum number of explorer lookups in flight
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Explorer API key
    #[arg(long, env = "ETHERSCAN_API_KEY")]
    api_key: Option<String>,

    /// Overrides the explorer endpoint of the network
    #[arg(long)]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).wrap_err("Setting default subscriber failed")?;

    let args = Args::parse();

    let abi = args
        .abi
        .as_deref()
        .map(load_abi_material)
        .transpose()
        .wrap_err("Failed to load ABI")?;

    let explorer: Arc<dyn ExplorerApi> = match &args.api_url {
        Some(url) => Arc::new(EtherscanClient::with_base_url(args.network, url.clone(), args.api_key.clone())),
        None => Arc::new(EtherscanClient::new(args.network, args.api_key.clone())),
    };

    let mut options = RunOptions::new(args.address, args.network);
    options.range = BlockRange::new(args.start_block, args.end_block);
    options.recursive = args.recursive;
    options.include_failed = args.include_failed;
    options.abi = abi;
    options.output_dir = args.output_dir.clone();
    options.concurrency = args.concurrency;
    options.trace = args.trace;

    let exporter = CsvExporter::new(args.output_dir);
    let summary = run(explorer, options, &exporter).await.wrap_err("Export failed")?;

    for (alias, count) in &summary.groups {
        tracing::info!(alias, transactions = count, "Exported group");
    }
    tracing::info!(
        transactions = summary.transactions,
        files = summary.export.files.len(),
        failed = summary.export.failed,
        "Export finished"
    );
    Ok(())
}
