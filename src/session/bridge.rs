//! Event bridge
//!
//! Installs one handler per wallet event kind for the lifetime of a session.
//! Handlers do no work themselves: they forward the event, tagged with the
//! session generation, into a channel the session store drains one event at a
//! time. Removing the handlers is tied to [`Subscription::unsubscribe`], which
//! consumes the subscription so it can only happen once.

use super::adapter::parse_account;
use crate::transport::{
    EventHandler, ListenerId, TransportCapabilities, WalletEvent, WalletEventKind, WalletTransport,
};
use alloy::primitives::Address;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A wallet event stamped with the session that subscribed to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeEvent {
    pub generation: u64,
    pub event: WalletEvent,
}

/// Store transition an event maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    SetAccount(Address),
    Disconnect,
    Reload,
    Ignore,
}

/// Map a wallet event to the transition it requires
pub fn translate(event: &WalletEvent) -> SessionAction {
    match event {
        WalletEvent::AccountsChanged(accounts) => match accounts.first() {
            None => SessionAction::Disconnect,
            Some(raw) => match parse_account(raw) {
                Ok(account) => SessionAction::SetAccount(account),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring accountsChanged with invalid account");
                    SessionAction::Ignore
                }
            },
        },
        // Network-dependent state elsewhere cannot be patched in place
        WalletEvent::ChainChanged(_) => SessionAction::Reload,
        WalletEvent::Disconnect(err) => {
            tracing::info!(code = err.code, message = %err.message, "Wallet transport disconnected");
            SessionAction::Disconnect
        }
    }
}

/// The handler set installed for one session
pub struct Subscription {
    transport: Arc<dyn WalletTransport>,
    generation: u64,
    listeners: Vec<(WalletEventKind, ListenerId)>,
    removable: bool,
}

impl Subscription {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Remove exactly the handlers this subscription installed.
    /// Returns how many were removed.
    pub fn unsubscribe(self) -> usize {
        if !self.removable {
            // Left-over handlers keep forwarding, but with a dead generation
            tracing::debug!(
                transport = self.transport.name(),
                generation = self.generation,
                "Transport cannot remove listeners; stale events will be dropped"
            );
            return 0;
        }

        let mut removed = 0;
        for (kind, id) in &self.listeners {
            match self.transport.remove_listener(*kind, *id) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(%kind, %id, error = %e, "Failed to remove wallet listener"),
            }
        }
        tracing::debug!(
            transport = self.transport.name(),
            generation = self.generation,
            removed,
            "Wallet listeners removed"
        );
        removed
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("transport", &self.transport.name())
            .field("generation", &self.generation)
            .field("listeners", &self.listeners)
            .finish()
    }
}

/// Producer side of the store's event channel
#[derive(Debug, Clone)]
pub struct EventBridge {
    tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl EventBridge {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn handler(&self, generation: u64) -> EventHandler {
        let tx = self.tx.clone();
        Arc::new(move |event: WalletEvent| {
            // Receiver is gone only when the store itself was dropped
            let _ = tx.send(BridgeEvent { generation, event });
        })
    }

    /// Install the three lifecycle handlers on `transport`.
    ///
    /// Returns `None` when the transport has no event capability or refuses a
    /// handler; in the latter case anything already installed is rolled back.
    pub fn subscribe(
        &self,
        transport: &Arc<dyn WalletTransport>,
        capabilities: TransportCapabilities,
        generation: u64,
    ) -> Option<Subscription> {
        if !capabilities.events {
            tracing::debug!(
                transport = transport.name(),
                "Transport has no event support; session will not track wallet changes"
            );
            return None;
        }

        let mut subscription = Subscription {
            transport: Arc::clone(transport),
            generation,
            listeners: Vec::with_capacity(WalletEventKind::ALL.len()),
            removable: capabilities.remove_listener,
        };

        for kind in WalletEventKind::ALL {
            match transport.on(kind, self.handler(generation)) {
                Ok(id) => subscription.listeners.push((kind, id)),
                Err(e) => {
                    tracing::warn!(
                        transport = transport.name(),
                        %kind,
                        error = %e,
                        "Failed to subscribe to wallet events"
                    );
                    subscription.unsubscribe();
                    return None;
                }
            }
        }

        tracing::debug!(
            transport = transport.name(),
            generation,
            listeners = subscription.len(),
            "Subscribed to wallet events"
        );
        Some(subscription)
    }
}
