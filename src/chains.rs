//! Static chain registry
//!
//! Human-readable metadata for the networks a wallet may report. The UI uses
//! this to label the active network; unknown chain ids simply have no entry.

use serde::Serialize;

/// Display metadata for one chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainData {
    pub chain_id: u64,
    /// Full display name (e.g., "Binance Smart Chain")
    pub name: &'static str,
    /// Short name used in compact layouts
    pub short_name: &'static str,
    /// Native currency symbol
    pub native_currency: &'static str,
    pub testnet: bool,
}

impl ChainData {
    const fn mainnet(
        chain_id: u64,
        name: &'static str,
        short_name: &'static str,
        native_currency: &'static str,
    ) -> Self {
        Self {
            chain_id,
            name,
            short_name,
            native_currency,
            testnet: false,
        }
    }

    const fn testnet(
        chain_id: u64,
        name: &'static str,
        short_name: &'static str,
        native_currency: &'static str,
    ) -> Self {
        Self {
            chain_id,
            name,
            short_name,
            native_currency,
            testnet: true,
        }
    }
}

const SUPPORTED_CHAINS: &[ChainData] = &[
    ChainData::mainnet(1, "Ethereum Mainnet", "eth", "ETH"),
    ChainData::mainnet(10, "Optimism", "oeth", "ETH"),
    ChainData::mainnet(56, "Binance Smart Chain", "bsc", "BNB"),
    ChainData::testnet(97, "Binance Smart Chain Testnet", "bnbt", "tBNB"),
    ChainData::mainnet(100, "Gnosis Chain", "gno", "xDAI"),
    ChainData::mainnet(137, "Polygon Mainnet", "matic", "MATIC"),
    ChainData::mainnet(8453, "Base", "base", "ETH"),
    ChainData::mainnet(42161, "Arbitrum One", "arb1", "ETH"),
    ChainData::mainnet(43114, "Avalanche C-Chain", "avax", "AVAX"),
    ChainData::testnet(80002, "Polygon Amoy", "amoy", "POL"),
    ChainData::testnet(11155111, "Sepolia", "sep", "ETH"),
];

/// Look up display metadata for a chain id
pub fn chain_data(chain_id: u64) -> Option<&'static ChainData> {
    SUPPORTED_CHAINS.iter().find(|c| c.chain_id == chain_id)
}

/// Network label for display, falling back to the raw id
pub fn network_label(chain_id: u64) -> String {
    match chain_data(chain_id) {
        Some(data) => data.name.to_string(),
        None => format!("Unknown network ({})", chain_id),
    }
}

/// Shorten an address for display: first and last `width` characters
pub fn ellipse_address(address: &str, width: usize) -> String {
    if address.is_empty() {
        return String::new();
    }
    if address.chars().count() <= width * 2 {
        return address.to_string();
    }
    let head: String = address.chars().take(width).collect();
    let tail: String = address
        .chars()
        .rev()
        .take(width)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{}...{}", head, tail)
}
