//! Configuration for the wallet session manager
//!
//! The provider configuration is static: it is loaded once at startup (from a
//! JSON file or the built-in defaults) and never mutated afterwards.

pub mod rpc;

use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;

// Re-export RPC config
pub use rpc::RpcConfig;

/// Infura project id environment variable name
pub const INFURA_ID_ENV: &str = "INFURA_API_KEY";

/// Registry names of the built-in providers
pub mod provider_names {
    pub const INJECTED: &str = "injected";
    pub const WALLETCONNECT: &str = "walletconnect";
    pub const WALLETLINK: &str = "custom-walletlink";
}

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Bsc,
    Polygon,
    Arbitrum,
    Optimism,
    Base,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => rpc::chains::ETHEREUM,
            Network::Bsc => rpc::chains::BSC,
            Network::Polygon => rpc::chains::POLYGON,
            Network::Arbitrum => rpc::chains::ARBITRUM,
            Network::Optimism => rpc::chains::OPTIMISM,
            Network::Base => rpc::chains::BASE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Bsc => "bsc",
            Network::Polygon => "polygon",
            Network::Arbitrum => "arbitrum",
            Network::Optimism => "optimism",
            Network::Base => "base",
        }
    }
}

/// How a provider is presented in the selection list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDisplay {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub logo: Option<String>,
}

impl ProviderDisplay {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            logo: None,
        }
    }
}

/// Connection parameters, one variant per transport kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Wallet injected into the client (reached through its local RPC endpoint)
    Injected { endpoint: String },
    /// Remote wallet paired through a relay bridge (QR code / deep link)
    Relay {
        bridge: String,
        chain_id: u64,
        #[serde(default = "default_true")]
        qrcode: bool,
    },
    /// Named alternative injected wallet
    Custom {
        endpoint: String,
        app_name: String,
        network_url: String,
        chain_id: u64,
    },
}

fn default_true() -> bool {
    true
}

impl TransportConfig {
    /// Kind tag as it appears in config files
    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::Injected { .. } => "injected",
            TransportConfig::Relay { .. } => "relay",
            TransportConfig::Custom { .. } => "custom",
        }
    }

    fn urls(&self) -> Vec<&str> {
        match self {
            TransportConfig::Injected { endpoint } => vec![endpoint.as_str()],
            TransportConfig::Relay { bridge, .. } => vec![bridge.as_str()],
            TransportConfig::Custom {
                endpoint,
                network_url,
                ..
            } => vec![endpoint.as_str(), network_url.as_str()],
        }
    }
}

/// One registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub display: ProviderDisplay,
    pub transport: TransportConfig,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default network for new sessions
    pub network: Network,
    /// Remember the last selected provider and reconnect to it on startup
    #[serde(default = "default_true")]
    pub cache_provider: bool,
    /// Where the preferred provider is persisted (in-memory when absent)
    #[serde(default)]
    pub cache_path: Option<String>,
    /// Event polling interval for transports without push events (milliseconds)
    pub poll_interval_ms: u64,
    /// Infura project id, used to build read endpoints
    #[serde(default, serialize_with = "serialize_redacted")]
    pub infura_id: Option<SecretString>,
    /// Connectable providers by registry name
    pub providers: BTreeMap<String, ProviderConfig>,
}

fn serialize_redacted<S: Serializer>(
    value: &Option<SecretString>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(_) => serializer.serialize_some("[REDACTED]"),
        None => serializer.serialize_none(),
    }
}

impl Config {
    /// Load from a JSON file, or fall back to the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
                serde_json::from_str(&content)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the registry is usable before anything tries to connect
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(Error::Config("no wallet providers configured".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }
        for (name, provider) in &self.providers {
            for raw in provider.transport.urls() {
                url::Url::parse(raw)
                    .map_err(|e| Error::Config(format!("provider '{}': {}: {}", name, raw, e)))?;
            }
        }
        Ok(())
    }

    /// Per-chain read endpoints; the configured Infura id takes precedence
    /// over public fallbacks
    pub fn rpc_config(&self) -> RpcConfig {
        let alchemy = std::env::var(rpc::env_vars::ALCHEMY_API_KEY)
            .ok()
            .map(SecretString::from);
        RpcConfig::resolve(
            |var| std::env::var(var).ok(),
            self.infura_id.as_ref(),
            alchemy.as_ref(),
        )
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Built-in registry: browser-injected wallet, WalletConnect relay and
    /// Coinbase Wallet as a named alternative injected wallet
    pub fn default_providers(infura_id: Option<&SecretString>) -> BTreeMap<String, ProviderConfig> {
        let network_url = infura_id
            .and_then(|id| rpc::infura_url(rpc::chains::ETHEREUM, id.expose_secret()))
            .unwrap_or_else(|| "https://eth.llamarpc.com".to_string());

        let mut providers = BTreeMap::new();
        providers.insert(
            provider_names::INJECTED.to_string(),
            ProviderConfig {
                display: ProviderDisplay::new("Browser Wallet", "Connect with your browser wallet"),
                transport: TransportConfig::Injected {
                    endpoint: "http://127.0.0.1:1248".to_string(),
                },
            },
        );
        providers.insert(
            provider_names::WALLETCONNECT.to_string(),
            ProviderConfig {
                display: ProviderDisplay::new(
                    "WalletConnect",
                    "Scan with WalletConnect to connect",
                ),
                transport: TransportConfig::Relay {
                    bridge: "https://bridge.walletconnect.org".to_string(),
                    chain_id: rpc::chains::ETHEREUM,
                    qrcode: true,
                },
            },
        );
        providers.insert(
            provider_names::WALLETLINK.to_string(),
            ProviderConfig {
                display: ProviderDisplay {
                    name: "Coinbase".to_string(),
                    description: "Connect to Coinbase Wallet (not Coinbase App)".to_string(),
                    logo: None,
                },
                transport: TransportConfig::Custom {
                    endpoint: "http://127.0.0.1:8545".to_string(),
                    app_name: "Coinbase".to_string(),
                    network_url,
                    chain_id: rpc::chains::ETHEREUM,
                },
            },
        );
        providers
    }
}

impl Default for Config {
    fn default() -> Self {
        let infura_id = std::env::var(INFURA_ID_ENV).ok().map(SecretString::from);
        Self {
            network: Network::Mainnet,
            cache_provider: true,
            cache_path: None,
            poll_interval_ms: 4_000,
            providers: Self::default_providers(infura_id.as_ref()),
            infura_id,
        }
    }
}
