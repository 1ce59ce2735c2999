//! Session adapter
//!
//! Wraps a freshly connected transport in an [`RpcHandle`] and derives the
//! session fields from the wallet itself. Nothing is carried over from an
//! earlier session: account and chain are queried on every call.

use crate::transport::{TransportCapabilities, WalletTransport};
use crate::{Error, Result};
use alloy::primitives::Address;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

/// Uniform RPC access to a connected wallet
#[derive(Clone)]
pub struct RpcHandle {
    transport: Arc<dyn WalletTransport>,
}

impl RpcHandle {
    pub fn new(transport: Arc<dyn WalletTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn WalletTransport> {
        &self.transport
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.transport.request(method, params).await
    }

    /// Accounts the wallet currently authorizes, primary first
    pub async fn accounts(&self) -> Result<Vec<Address>> {
        let raw: Vec<String> = serde_json::from_value(self.request("eth_accounts", json!([])).await?)?;
        raw.iter().map(|a| parse_account(a)).collect()
    }

    /// The wallet's primary authorized account
    pub async fn primary_account(&self) -> Result<Address> {
        self.accounts().await?.into_iter().next().ok_or(Error::NoAccount)
    }

    /// Chain the wallet is on right now
    pub async fn chain_id(&self) -> Result<u64> {
        let value = self
            .request("eth_chainId", json!([]))
            .await
            .map_err(|e| Error::NetworkQuery(e.to_string()))?;
        parse_chain_id(&value)
    }
}

impl std::fmt::Debug for RpcHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcHandle")
            .field("transport", &self.transport.name())
            .finish()
    }
}

/// Parse a wallet-reported address
pub fn parse_account(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).map_err(|e| Error::InvalidAddress(format!("{}: {}", raw, e)))
}

/// Parse a chain id reported as hex string, decimal string or number
pub fn parse_chain_id(value: &Value) -> Result<u64> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    };
    parsed.ok_or_else(|| Error::NetworkQuery(format!("unparsable chain id: {}", value)))
}

/// Everything a new session needs from the wallet
#[derive(Debug)]
pub struct AdaptedSession {
    pub rpc: RpcHandle,
    pub account: Address,
    pub chain_id: u64,
    pub capabilities: TransportCapabilities,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SessionAdapter;

impl SessionAdapter {
    pub fn new() -> Self {
        Self
    }

    pub async fn adapt(&self, transport: Arc<dyn WalletTransport>) -> Result<AdaptedSession> {
        let capabilities = transport.capabilities();
        let rpc = RpcHandle::new(transport);

        let (account, chain_id) = futures::try_join!(rpc.primary_account(), rpc.chain_id())?;

        tracing::debug!(
            transport = rpc.transport().name(),
            account = %account,
            chain_id,
            ?capabilities,
            "Adapted wallet transport"
        );

        Ok(AdaptedSession {
            rpc,
            account,
            chain_id,
            capabilities,
        })
    }
}
