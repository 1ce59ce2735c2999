//! Per-chain RPC endpoint resolution
//!
//! Relay wallets need a read endpoint for every chain they may be asked to
//! switch to. Endpoints are resolved from the environment in this order:
//! 1. Per-chain env vars (ETH_RPC_URL, BSC_RPC_URL, ...) - highest priority
//! 2. INFURA_API_KEY - builds URLs for the chains Infura serves
//! 3. ALCHEMY_API_KEY - builds URLs for the chains Alchemy serves
//! 4. Public RPC fallbacks - rate limited, for testing only
//!
//! # Examples
//!
//! ```bash
//! export ETH_RPC_URL="https://mainnet.infura.io/v3/YOUR_PROJECT_ID"
//! export BSC_RPC_URL="https://bsc-dataseed.binance.org"
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

/// Chain ID constants
pub mod chains {
    pub const ETHEREUM: u64 = 1;
    pub const OPTIMISM: u64 = 10;
    pub const BSC: u64 = 56;
    pub const POLYGON: u64 = 137;
    pub const BASE: u64 = 8453;
    pub const ARBITRUM: u64 = 42161;
}

/// Environment variable names
pub mod env_vars {
    pub const INFURA_API_KEY: &str = "INFURA_API_KEY";
    pub const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";
}

/// (chain, per-chain env var, public fallback)
const CHAIN_TABLE: &[(u64, &str, &str)] = &[
    (chains::ETHEREUM, "ETH_RPC_URL", "https://eth.llamarpc.com"),
    (chains::OPTIMISM, "OPTIMISM_RPC_URL", "https://mainnet.optimism.io"),
    (chains::BSC, "BSC_RPC_URL", "https://bsc-dataseed.binance.org"),
    (chains::POLYGON, "POLYGON_RPC_URL", "https://polygon-rpc.com"),
    (chains::BASE, "BASE_RPC_URL", "https://mainnet.base.org"),
    (chains::ARBITRUM, "ARBITRUM_RPC_URL", "https://arb1.arbitrum.io/rpc"),
];

/// Infura URL for a chain, if Infura serves it
pub fn infura_url(chain_id: u64, project_id: &str) -> Option<String> {
    let subdomain = match chain_id {
        chains::ETHEREUM => "mainnet",
        chains::OPTIMISM => "optimism-mainnet",
        chains::POLYGON => "polygon-mainnet",
        chains::ARBITRUM => "arbitrum-mainnet",
        // Infura has no BSC or Base endpoints
        _ => return None,
    };
    Some(format!("https://{}.infura.io/v3/{}", subdomain, project_id))
}

fn alchemy_url(chain_id: u64, key: &str) -> Option<String> {
    let subdomain = match chain_id {
        chains::ETHEREUM => "eth-mainnet",
        chains::OPTIMISM => "opt-mainnet",
        chains::POLYGON => "polygon-mainnet",
        chains::BASE => "base-mainnet",
        chains::ARBITRUM => "arb-mainnet",
        _ => return None,
    };
    Some(format!("https://{}.g.alchemy.com/v2/{}", subdomain, key))
}

/// RPC configuration for multiple chains
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// RPC URLs indexed by chain ID
    urls: HashMap<u64, String>,
}

impl RpcConfig {
    /// Resolve RPC URLs from environment variables
    pub fn from_env() -> Self {
        let infura = std::env::var(env_vars::INFURA_API_KEY)
            .ok()
            .map(SecretString::from);
        let alchemy = std::env::var(env_vars::ALCHEMY_API_KEY)
            .ok()
            .map(SecretString::from);
        Self::resolve(|var| std::env::var(var).ok(), infura.as_ref(), alchemy.as_ref())
    }

    /// Resolve URLs from an arbitrary lookup (env, dotenv map, test fixture)
    pub fn resolve(
        lookup: impl Fn(&str) -> Option<String>,
        infura: Option<&SecretString>,
        alchemy: Option<&SecretString>,
    ) -> Self {
        let mut urls = HashMap::new();

        for &(chain_id, var, public) in CHAIN_TABLE {
            let url = if let Some(url) = lookup(var) {
                tracing::debug!(chain_id, var, "Using per-chain RPC URL");
                url
            } else if let Some(url) = infura.and_then(|k| infura_url(chain_id, k.expose_secret())) {
                url
            } else if let Some(url) = alchemy.and_then(|k| alchemy_url(chain_id, k.expose_secret())) {
                url
            } else {
                tracing::debug!(chain_id, "No RPC configured, using public endpoint");
                public.to_string()
            };
            urls.insert(chain_id, url);
        }

        Self { urls }
    }

    /// Create with explicit RPC URLs
    pub fn with_urls(urls: HashMap<u64, String>) -> Self {
        Self { urls }
    }

    /// Get RPC URL for a chain
    pub fn get(&self, chain_id: u64) -> Option<&str> {
        self.urls.get(&chain_id).map(|s| s.as_str())
    }

    /// Check if a chain is configured
    pub fn has_chain(&self, chain_id: u64) -> bool {
        self.urls.contains_key(&chain_id)
    }

    /// Copy out the chain -> URL map
    pub fn to_hashmap(&self) -> HashMap<u64, String> {
        self.urls.clone()
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
