//! Networks served by the block explorer and their API endpoints.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// A network supported by the explorer API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Ethereum mainnet
    #[default]
    Mainnet,
    /// Ropsten testnet
    Ropsten,
    /// Kovan testnet
    Kovan,
    /// Rinkeby testnet
    Rinkeby,
    /// Goerli testnet
    Goerli,
}

impl Network {
    /// Base URL of the explorer API for this network.
    pub fn api_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.etherscan.io/api",
            Network::Ropsten => "https://api-ropsten.etherscan.io/api",
            Network::Kovan => "https://api-kovan.etherscan.io/api",
            Network::Rinkeby => "https://api-rinkeby.etherscan.io/api",
            Network::Goerli => "https://api-goerli.etherscan.io/api",
        }
    }

    /// Lower-case network name.
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Ropsten => "ropsten",
            Network::Kovan => "kovan",
            Network::Rinkeby => "rinkeby",
            Network::Goerli => "goerli",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
