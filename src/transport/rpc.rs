//! JSON-RPC wallet transport
//!
//! Talks to a wallet that exposes an HTTP JSON-RPC endpoint (desktop wallets
//! acting as an injected provider, or a relay bridge). HTTP cannot push, so
//! lifecycle events are produced by a polling task that diffs `eth_accounts`
//! and `eth_chainId` and reports `disconnect` after repeated failures.

use super::{
    EventHandler, ListenerId, Listeners, ProviderRpcError, TransportCapabilities, WalletEvent,
    WalletEventKind, WalletTransport,
};
use crate::{Error, Result};
use alloy::providers::{Provider, RootProvider};
use alloy::transports::TransportError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// EIP-1193 "user rejected request"
const USER_REJECTED: i64 = 4001;
/// EIP-1193 "provider disconnected from all chains"
const DISCONNECTED: i64 = 4900;

/// Settings for one [`RpcTransport`]
#[derive(Debug, Clone)]
pub struct RpcTransportOptions {
    /// Registry name reported by [`WalletTransport::name`]
    pub name: String,
    /// Wallet endpoint: accounts, chain id, signing and `wallet_*` methods
    pub endpoint: Url,
    /// Optional endpoint for plain chain reads
    pub read_endpoint: Option<Url>,
    pub poll_interval: Duration,
    /// Consecutive poll failures before `disconnect` is emitted
    pub max_poll_failures: u32,
}

impl RpcTransportOptions {
    pub fn new(name: impl Into<String>, endpoint: Url) -> Self {
        Self {
            name: name.into(),
            endpoint,
            read_endpoint: None,
            poll_interval: Duration::from_secs(4),
            max_poll_failures: 3,
        }
    }
}

/// Wallet transport over HTTP JSON-RPC
pub struct RpcTransport {
    name: String,
    wallet: RootProvider,
    reader: Option<RootProvider>,
    poll_interval: Duration,
    max_poll_failures: u32,
    listeners: Arc<Listeners>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl RpcTransport {
    pub fn new(options: RpcTransportOptions) -> Self {
        Self {
            name: options.name,
            wallet: RootProvider::new_http(options.endpoint),
            reader: options.read_endpoint.map(RootProvider::new_http),
            poll_interval: options.poll_interval,
            max_poll_failures: options.max_poll_failures.max(1),
            listeners: Arc::new(Listeners::default()),
            poller: Mutex::new(None),
        }
    }

    /// Methods that must be answered by the wallet rather than a read node
    fn is_wallet_method(method: &str) -> bool {
        method.starts_with("wallet_")
            || method.starts_with("personal_")
            || method.starts_with("eth_sign")
            || matches!(
                method,
                "eth_accounts" | "eth_requestAccounts" | "eth_chainId" | "eth_sendTransaction"
            )
    }

    fn route(&self, method: &str) -> &RootProvider {
        match &self.reader {
            Some(reader) if !Self::is_wallet_method(method) => reader,
            _ => &self.wallet,
        }
    }

    fn map_rpc_error(method: &str, err: TransportError) -> Error {
        if let Some(payload) = err.as_error_resp() {
            if payload.code == USER_REJECTED {
                return Error::UserCancelled;
            }
            return Error::Rpc(format!("{} failed ({}): {}", method, payload.code, payload.message));
        }
        Error::Rpc(format!("{} failed: {}", method, err))
    }

    fn ensure_poller(&self) -> Result<()> {
        let mut poller = self.poller.lock().unwrap_or_else(|p| p.into_inner());
        if poller.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Rpc("event polling needs a tokio runtime".to_string()))?;

        let task = EventPoller {
            wallet: self.wallet.clone(),
            listeners: Arc::clone(&self.listeners),
            interval: self.poll_interval,
            max_failures: self.max_poll_failures,
        };
        tracing::debug!(transport = %self.name, "Starting wallet event poller");
        *poller = Some(runtime.spawn(task.run()));
        Ok(())
    }

    fn stop_poller(&self) {
        let mut poller = self.poller.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(task) = poller.take() {
            task.abort();
            tracing::debug!(transport = %self.name, "Stopped wallet event poller");
        }
    }
}

#[async_trait]
impl WalletTransport for RpcTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities::ALL
    }

    async fn enable(&self) -> Result<Vec<String>> {
        let accounts = self.request("eth_requestAccounts", json!([])).await?;
        Ok(serde_json::from_value(accounts)?)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.route(method)
            .raw_request::<Value, Value>(Cow::Owned(method.to_string()), params)
            .await
            .map_err(|e| Self::map_rpc_error(method, e))
    }

    fn on(&self, kind: WalletEventKind, handler: EventHandler) -> Result<ListenerId> {
        self.ensure_poller()?;
        Ok(self.listeners.add(kind, handler))
    }

    fn remove_listener(&self, kind: WalletEventKind, id: ListenerId) -> Result<()> {
        if !self.listeners.remove(kind, id) {
            tracing::debug!(transport = %self.name, %kind, %id, "Listener was not registered");
        }
        if self.listeners.is_empty() {
            self.stop_poller();
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.stop_poller();
        Ok(())
    }
}

impl Drop for RpcTransport {
    fn drop(&mut self) {
        self.stop_poller();
    }
}

/// Background task that turns state diffs into wallet events
struct EventPoller {
    wallet: RootProvider,
    listeners: Arc<Listeners>,
    interval: Duration,
    max_failures: u32,
}

impl EventPoller {
    async fn snapshot(&self) -> std::result::Result<(Vec<String>, String), TransportError> {
        let accounts = self
            .wallet
            .raw_request::<Value, Vec<String>>(Cow::Borrowed("eth_accounts"), json!([]));
        let chain = self
            .wallet
            .raw_request::<Value, String>(Cow::Borrowed("eth_chainId"), json!([]));
        futures::try_join!(accounts, chain)
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        let mut last: Option<(Vec<String>, String)> = None;
        let mut failures = 0u32;

        loop {
            ticker.tick().await;
            match self.snapshot().await {
                Ok((accounts, chain)) => {
                    failures = 0;
                    if let Some((prev_accounts, prev_chain)) = &last {
                        if *prev_accounts != accounts {
                            self.listeners
                                .emit(WalletEvent::AccountsChanged(accounts.clone()));
                        }
                        if *prev_chain != chain {
                            self.listeners.emit(WalletEvent::ChainChanged(chain.clone()));
                        }
                    }
                    last = Some((accounts, chain));
                }
                Err(e) => {
                    failures += 1;
                    tracing::debug!(error = %e, failures, "Wallet poll failed");
                    if failures >= self.max_failures {
                        tracing::warn!(failures, "Wallet endpoint unreachable, emitting disconnect");
                        self.listeners.emit(WalletEvent::Disconnect(ProviderRpcError {
                            code: DISCONNECTED,
                            message: e.to_string(),
                        }));
                        return;
                    }
                }
            }
        }
    }
}
