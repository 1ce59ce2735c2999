//! Scriptable in-memory transport for tests

use super::{
    EventHandler, ListenerId, Listeners, TransportCapabilities, WalletEvent, WalletEventKind,
    WalletTransport,
};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) const ACCOUNT_A: &str = "0x00000000000000000000000000000000000abc01";
pub(crate) const ACCOUNT_B: &str = "0x00000000000000000000000000000000000abc02";

pub(crate) struct MockTransport {
    name: String,
    capabilities: TransportCapabilities,
    accounts: Mutex<Vec<String>>,
    /// None makes `eth_chainId` fail
    chain_id: Mutex<Option<String>>,
    fail_disconnect: bool,
    /// `disconnect` never resolves
    hang_disconnect: bool,
    listeners: Listeners,
    requests: Mutex<Vec<String>>,
    disconnects: AtomicUsize,
    removals: AtomicUsize,
}

impl MockTransport {
    /// BSC wallet with one authorized account and every optional capability
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capabilities: TransportCapabilities::ALL,
            accounts: Mutex::new(vec![ACCOUNT_A.to_string()]),
            chain_id: Mutex::new(Some("0x38".to_string())),
            fail_disconnect: false,
            hang_disconnect: false,
            listeners: Listeners::default(),
            requests: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
            removals: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_capabilities(mut self, capabilities: TransportCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub(crate) fn with_accounts(self, accounts: &[&str]) -> Self {
        *self.accounts.lock().unwrap() = accounts.iter().map(|a| a.to_string()).collect();
        self
    }

    pub(crate) fn with_chain_id(self, chain_id: Option<&str>) -> Self {
        *self.chain_id.lock().unwrap() = chain_id.map(str::to_string);
        self
    }

    pub(crate) fn failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    pub(crate) fn hanging_disconnect(mut self) -> Self {
        self.hang_disconnect = true;
        self
    }

    pub(crate) fn set_accounts(&self, accounts: &[&str]) {
        *self.accounts.lock().unwrap() = accounts.iter().map(|a| a.to_string()).collect();
    }

    /// Deliver an event the way the wallet would; returns handlers reached
    pub(crate) fn emit(&self, event: WalletEvent) -> usize {
        self.listeners.emit(event)
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn request_count(&self, method: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.as_str() == method)
            .count()
    }

    pub(crate) fn disconnect_calls(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub(crate) fn removed_listeners(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletTransport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> TransportCapabilities {
        self.capabilities
    }

    async fn enable(&self) -> Result<Vec<String>> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn request(&self, method: &str, _params: Value) -> Result<Value> {
        self.requests.lock().unwrap().push(method.to_string());
        match method {
            "eth_accounts" | "eth_requestAccounts" => Ok(json!(*self.accounts.lock().unwrap())),
            "eth_chainId" => match self.chain_id.lock().unwrap().clone() {
                Some(id) => Ok(json!(id)),
                None => Err(Error::Rpc("eth_chainId failed: unavailable".to_string())),
            },
            other => Err(Error::Rpc(format!("{} not mocked", other))),
        }
    }

    fn on(&self, kind: WalletEventKind, handler: EventHandler) -> Result<ListenerId> {
        if !self.capabilities.events {
            return Err(Error::Unsupported("event subscription"));
        }
        Ok(self.listeners.add(kind, handler))
    }

    fn remove_listener(&self, kind: WalletEventKind, id: ListenerId) -> Result<()> {
        if !self.capabilities.remove_listener {
            return Err(Error::Unsupported("listener removal"));
        }
        if self.listeners.remove(kind, id) {
            self.removals.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.capabilities.disconnect {
            return Err(Error::Unsupported("disconnect"));
        }
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.hang_disconnect {
            std::future::pending::<()>().await;
        }
        if self.fail_disconnect {
            return Err(Error::Rpc("relay closed the socket".to_string()));
        }
        Ok(())
    }
}
