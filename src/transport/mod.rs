//! Wallet transport capability contract
//!
//! A transport is the low-level connection to one wallet. Every transport can
//! be enabled and can answer JSON-RPC requests. Event subscription, listener
//! removal and an explicit disconnect are optional; a transport declares which
//! of them it has through [`TransportCapabilities`], and callers read that set
//! once instead of probing each call.

mod rpc;

#[cfg(test)]
pub(crate) mod mock;

pub use rpc::{RpcTransport, RpcTransportOptions};

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Optional parts of the transport contract
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportCapabilities {
    /// `on` is supported
    pub events: bool,
    /// `remove_listener` is supported
    pub remove_listener: bool,
    /// `disconnect` is supported
    pub disconnect: bool,
}

impl TransportCapabilities {
    /// Request/response only
    pub const NONE: Self = Self {
        events: false,
        remove_listener: false,
        disconnect: false,
    };

    pub const ALL: Self = Self {
        events: true,
        remove_listener: true,
        disconnect: true,
    };
}

/// Wallet-originated lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletEventKind {
    #[serde(rename = "accountsChanged")]
    AccountsChanged,
    #[serde(rename = "chainChanged")]
    ChainChanged,
    #[serde(rename = "disconnect")]
    Disconnect,
}

impl WalletEventKind {
    pub const ALL: [WalletEventKind; 3] = [
        WalletEventKind::AccountsChanged,
        WalletEventKind::ChainChanged,
        WalletEventKind::Disconnect,
    ];

    /// EIP-1193 event name
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletEventKind::AccountsChanged => "accountsChanged",
            WalletEventKind::ChainChanged => "chainChanged",
            WalletEventKind::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for WalletEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload carried by a `disconnect` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
}

/// One delivered wallet event with its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// Accounts the wallet now authorizes, primary first
    AccountsChanged(Vec<String>),
    /// New chain id as reported by the wallet (usually hex)
    ChainChanged(String),
    Disconnect(ProviderRpcError),
}

impl WalletEvent {
    pub fn kind(&self) -> WalletEventKind {
        match self {
            WalletEvent::AccountsChanged(_) => WalletEventKind::AccountsChanged,
            WalletEvent::ChainChanged(_) => WalletEventKind::ChainChanged,
            WalletEvent::Disconnect(_) => WalletEventKind::Disconnect,
        }
    }
}

/// Callback installed with [`WalletTransport::on`]
pub type EventHandler = Arc<dyn Fn(WalletEvent) + Send + Sync>;

/// Handle returned by [`WalletTransport::on`], needed to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Low-level connection to a wallet
#[async_trait]
pub trait WalletTransport: Send + Sync {
    /// Registry name of the provider that created this transport
    fn name(&self) -> &str;

    /// Which optional operations this transport implements
    fn capabilities(&self) -> TransportCapabilities;

    /// Ask the wallet to authorize this client. May prompt the user.
    async fn enable(&self) -> Result<Vec<String>>;

    /// Forward a JSON-RPC request to the wallet
    async fn request(&self, method: &str, params: Value) -> Result<Value>;

    fn on(&self, kind: WalletEventKind, handler: EventHandler) -> Result<ListenerId> {
        let _ = (kind, handler);
        Err(Error::Unsupported("event subscription"))
    }

    fn remove_listener(&self, kind: WalletEventKind, id: ListenerId) -> Result<()> {
        let _ = (kind, id);
        Err(Error::Unsupported("listener removal"))
    }

    /// Tear down the wallet-side session
    async fn disconnect(&self) -> Result<()> {
        Err(Error::Unsupported("disconnect"))
    }
}

/// Listener table shared by transports that emit events
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<ListenerId, (WalletEventKind, EventHandler)>>,
}

impl Listeners {
    pub(crate) fn add(&self, kind: WalletEventKind, handler: EventHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, (kind, handler));
        id
    }

    /// Returns false when `id` was not registered for `kind`
    pub(crate) fn remove(&self, kind: WalletEventKind, id: ListenerId) -> bool {
        let mut handlers = self.lock();
        match handlers.get(&id) {
            Some((registered, _)) if *registered == kind => {
                handlers.remove(&id);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver to every listener of the event's kind. Handlers run outside the lock.
    pub(crate) fn emit(&self, event: WalletEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<EventHandler> = self
            .lock()
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in &targets {
            handler(event.clone());
        }
        targets.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ListenerId, (WalletEventKind, EventHandler)>> {
        // Handlers never run under this lock.
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
