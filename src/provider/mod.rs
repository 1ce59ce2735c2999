//! Wallet provider registry
//!
//! The registry pairs each configured provider with a factory for its
//! transport kind. Factories are pluggable: the built-in
//! [`RpcTransportFactory`] serves every kind, and a host with a native bridge
//! (e.g. a browser build) registers its own per kind.

mod cache;
mod selector;

pub use cache::{FileCache, MemoryCache, ProviderCache};
pub use selector::{FixedPicker, ProviderChoice, ProviderPicker, ProviderSelector, Selected};

use crate::config::{Config, ProviderConfig, RpcConfig, TransportConfig};
use crate::transport::{RpcTransport, RpcTransportOptions, WalletTransport};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Builds a connected transport for one registry entry
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Instantiate and enable the transport. Errors other than
    /// [`Error::UserCancelled`] are reported as [`Error::TransportInit`].
    async fn create(&self, name: &str, config: &ProviderConfig)
        -> Result<Arc<dyn WalletTransport>>;
}

/// Factory for wallets reachable over HTTP JSON-RPC
#[derive(Debug, Clone)]
pub struct RpcTransportFactory {
    poll_interval: Duration,
    /// Read endpoints for relay sessions, by chain
    rpc: RpcConfig,
}

impl RpcTransportFactory {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            rpc: RpcConfig::with_urls(HashMap::new()),
        }
    }

    pub fn with_rpc(mut self, rpc: RpcConfig) -> Self {
        self.rpc = rpc;
        self
    }

    fn parse_url(name: &str, raw: &str) -> Result<Url> {
        raw.parse().map_err(|e| Error::TransportInit {
            provider: name.to_string(),
            reason: format!("invalid endpoint {}: {}", raw, e),
        })
    }

    fn options(&self, name: &str, config: &ProviderConfig) -> Result<RpcTransportOptions> {
        let mut options = match &config.transport {
            TransportConfig::Injected { endpoint } => {
                RpcTransportOptions::new(name, Self::parse_url(name, endpoint)?)
            }
            TransportConfig::Relay {
                bridge, chain_id, ..
            } => {
                let mut options = RpcTransportOptions::new(name, Self::parse_url(name, bridge)?);
                if let Some(url) = self.rpc.get(*chain_id) {
                    options.read_endpoint = Some(Self::parse_url(name, url)?);
                }
                options
            }
            TransportConfig::Custom {
                endpoint,
                network_url,
                app_name,
                ..
            } => {
                tracing::debug!(provider = name, app_name = %app_name, "Preparing custom wallet");
                let mut options = RpcTransportOptions::new(name, Self::parse_url(name, endpoint)?);
                options.read_endpoint = Some(Self::parse_url(name, network_url)?);
                options
            }
        };
        options.poll_interval = self.poll_interval;
        Ok(options)
    }
}

#[async_trait]
impl TransportFactory for RpcTransportFactory {
    async fn create(
        &self,
        name: &str,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn WalletTransport>> {
        let init_err = |reason: String| Error::TransportInit {
            provider: name.to_string(),
            reason,
        };

        let transport = RpcTransport::new(self.options(name, config)?);

        if let TransportConfig::Relay {
            chain_id, qrcode, ..
        } = &config.transport
        {
            // Relay must answer before the user is asked to pair
            let reported = transport
                .request("eth_chainId", json!([]))
                .await
                .map_err(|e| init_err(format!("relay unreachable: {}", e)))?;
            tracing::info!(
                provider = name,
                expected_chain_id = chain_id,
                reported = %reported,
                qrcode,
                "Relay reachable, waiting for wallet pairing"
            );
        }

        match transport.enable().await {
            Ok(accounts) => {
                tracing::debug!(provider = name, accounts = accounts.len(), "Wallet enabled");
            }
            Err(Error::UserCancelled) => return Err(Error::UserCancelled),
            Err(e) => return Err(init_err(e.to_string())),
        }

        Ok(Arc::new(transport))
    }
}

/// Connectable providers and the factories that build them
pub struct ProviderRegistry {
    entries: BTreeMap<String, ProviderConfig>,
    factories: HashMap<&'static str, Arc<dyn TransportFactory>>,
}

impl ProviderRegistry {
    /// Registry without factories; add them with [`with_factory`](Self::with_factory)
    pub fn new(entries: BTreeMap<String, ProviderConfig>) -> Self {
        Self {
            entries,
            factories: HashMap::new(),
        }
    }

    /// Registry over the configured providers, JSON-RPC factory for every kind
    pub fn from_config(config: &Config) -> Self {
        let factory: Arc<dyn TransportFactory> = Arc::new(
            RpcTransportFactory::new(Duration::from_millis(config.poll_interval_ms))
                .with_rpc(config.rpc_config()),
        );
        Self::new(config.providers.clone())
            .with_factory("injected", Arc::clone(&factory))
            .with_factory("relay", Arc::clone(&factory))
            .with_factory("custom", factory)
    }

    /// Use `factory` for every entry of transport kind `kind`
    pub fn with_factory(mut self, kind: &'static str, factory: Arc<dyn TransportFactory>) -> Self {
        self.factories.insert(kind, factory);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in display order
    pub fn choices(&self) -> Vec<ProviderChoice> {
        self.entries
            .iter()
            .map(|(name, config)| ProviderChoice {
                name: name.clone(),
                kind: config.transport.kind(),
                display: config.display.clone(),
            })
            .collect()
    }

    /// Build a connected transport for `name`
    pub async fn instantiate(&self, name: &str) -> Result<Arc<dyn WalletTransport>> {
        let config = self
            .entries
            .get(name)
            .ok_or_else(|| Error::UnknownProvider(name.to_string()))?;
        let kind = config.transport.kind();
        let factory = self.factories.get(kind).ok_or_else(|| Error::TransportInit {
            provider: name.to_string(),
            reason: format!("no transport factory registered for kind '{}'", kind),
        })?;

        tracing::debug!(provider = name, kind, "Instantiating wallet transport");
        factory.create(name, config).await
    }
}
