//! Wallet session store
//!
//! Owns the single current session and every transition on it:
//!
//! - `connect` / `reconnect_if_cached`: select a provider, adapt the transport,
//!   install the session and subscribe to its events
//! - `disconnect`: clear the cached provider, tear down the wallet side,
//!   unsubscribe, reset
//! - `account_changed` / `chain_changed`: wallet-driven updates
//!
//! The state is a tagged enum, so a connected session always has its account,
//! chain and transport together. Wallet events reach the store through the
//! [`EventBridge`] channel and are applied one at a time by
//! [`SessionStore::process_pending`] or [`SessionStore::run_events`].

mod adapter;
mod bridge;

pub use adapter::{parse_account, parse_chain_id, AdaptedSession, RpcHandle, SessionAdapter};
pub use bridge::{translate, BridgeEvent, EventBridge, SessionAction, Subscription};

use crate::chains;
use crate::platform::Platform;
use crate::provider::{ProviderSelector, Selected};
use crate::transport::{TransportCapabilities, WalletTransport};
use crate::{Error, Result};
use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Read-only view of the active session, for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub provider: String,
    pub account: Address,
    pub chain_id: u64,
    pub connected_at: DateTime<Utc>,
    pub capabilities: TransportCapabilities,
}

impl SessionSnapshot {
    /// Human-readable network name
    pub fn network_label(&self) -> String {
        chains::network_label(self.chain_id)
    }

    /// Checksummed account shortened for compact layouts
    pub fn short_account(&self) -> String {
        chains::ellipse_address(&self.account.to_checksum(None), 10)
    }
}

/// Result of a connect call that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(SessionSnapshot),
    /// Another connect was already waiting on the wallet; this call did nothing
    InFlight,
}

impl ConnectOutcome {
    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        match self {
            ConnectOutcome::Connected(snapshot) => Some(snapshot),
            ConnectOutcome::InFlight => None,
        }
    }
}

struct ActiveSession {
    session_id: Uuid,
    generation: u64,
    provider: String,
    transport: Arc<dyn WalletTransport>,
    rpc: RpcHandle,
    account: Address,
    chain_id: u64,
    capabilities: TransportCapabilities,
    connected_at: DateTime<Utc>,
    subscription: Option<Subscription>,
}

impl ActiveSession {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            provider: self.provider.clone(),
            account: self.account,
            chain_id: self.chain_id,
            connected_at: self.connected_at,
            capabilities: self.capabilities,
        }
    }

    fn release(self) {
        tracing::debug!(session_id = %self.session_id, provider = %self.provider, "Released wallet session");
    }
}

// Handlers come off with the session on every path, including a dropped
// disconnect future.
impl Drop for ActiveSession {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

enum SessionState {
    Disconnected,
    Connected(ActiveSession),
}

/// Clears the in-flight flag when the connect attempt ends, however it ends
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Upper bound on waiting for a wallet to acknowledge `disconnect`
pub const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SessionStore {
    selector: ProviderSelector,
    adapter: SessionAdapter,
    platform: Platform,
    bridge: EventBridge,
    events: Mutex<mpsc::UnboundedReceiver<BridgeEvent>>,
    state: Mutex<SessionState>,
    connecting: AtomicBool,
    generation: AtomicU64,
    teardown_timeout: Duration,
}

impl SessionStore {
    pub fn new(selector: ProviderSelector, platform: Platform) -> Self {
        let (bridge, events) = EventBridge::new();
        Self {
            selector,
            adapter: SessionAdapter::new(),
            platform,
            bridge,
            events: Mutex::new(events),
            state: Mutex::new(SessionState::Disconnected),
            connecting: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
        }
    }

    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }

    pub fn selector(&self) -> &ProviderSelector {
        &self.selector
    }

    /// A connect or cached reconnect is waiting on the wallet
    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::Acquire)
    }

    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        match &*self.state.lock().await {
            SessionState::Connected(session) => Some(session.snapshot()),
            SessionState::Disconnected => None,
        }
    }

    pub async fn is_connected(&self) -> bool {
        matches!(&*self.state.lock().await, SessionState::Connected(_))
    }

    pub async fn account(&self) -> Option<Address> {
        self.snapshot().await.map(|s| s.account)
    }

    pub async fn chain_id(&self) -> Option<u64> {
        self.snapshot().await.map(|s| s.chain_id)
    }

    /// RPC handle of the active session
    pub async fn rpc(&self) -> Option<RpcHandle> {
        match &*self.state.lock().await {
            SessionState::Connected(session) => Some(session.rpc.clone()),
            SessionState::Disconnected => None,
        }
    }

    /// Let the user pick a wallet and connect to it.
    ///
    /// On failure the store is left as it was. A call made while another
    /// connect is pending returns [`ConnectOutcome::InFlight`] without
    /// touching the wallet.
    pub async fn connect(&self) -> Result<ConnectOutcome> {
        let Some(_in_flight) = InFlight::acquire(&self.connecting) else {
            tracing::debug!("Connect already in flight, ignoring");
            return Ok(ConnectOutcome::InFlight);
        };

        let result = match self.selector.select().await {
            Ok(selected) => self.establish(selected).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(snapshot) => Ok(ConnectOutcome::Connected(snapshot)),
            Err(Error::UserCancelled) => {
                tracing::info!("Wallet connection cancelled by user");
                Err(Error::UserCancelled)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Wallet connection failed");
                Err(e)
            }
        }
    }

    /// Reconnect to the cached provider without asking the user.
    ///
    /// Runs unattended at startup, so failures are logged and swallowed.
    pub async fn reconnect_if_cached(&self) -> Option<SessionSnapshot> {
        let cache = self.platform.cache()?;
        let provider = match cache.load().await {
            Ok(Some(provider)) => provider,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read cached wallet provider");
                return None;
            }
        };

        let Some(_in_flight) = InFlight::acquire(&self.connecting) else {
            tracing::debug!(provider = %provider, "Connect already in flight, skipping cached reconnect");
            return None;
        };

        tracing::info!(provider = %provider, "Reconnecting to cached wallet provider");
        let result = match self.selector.select_named(&provider).await {
            Ok(selected) => self.establish(selected).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Cached wallet reconnect failed");
                None
            }
        }
    }

    async fn establish(&self, selected: Selected) -> Result<SessionSnapshot> {
        let Selected {
            provider,
            transport,
        } = selected;
        let adapted = self.adapter.adapt(Arc::clone(&transport)).await?;

        if let Some(cache) = self.platform.cache() {
            if let Err(e) = cache.store(&provider).await {
                tracing::warn!(provider = %provider, error = %e, "Could not cache wallet provider");
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let mut state = self.state.lock().await;

        if let SessionState::Connected(previous) =
            std::mem::replace(&mut *state, SessionState::Disconnected)
        {
            tracing::info!(
                previous = %previous.session_id,
                provider = %previous.provider,
                "Replacing active wallet session"
            );
            previous.release();
        }

        let subscription = self
            .bridge
            .subscribe(&transport, adapted.capabilities, generation);
        let session = ActiveSession {
            session_id: Uuid::new_v4(),
            generation,
            provider,
            transport,
            rpc: adapted.rpc,
            account: adapted.account,
            chain_id: adapted.chain_id,
            capabilities: adapted.capabilities,
            connected_at: Utc::now(),
            subscription,
        };
        let snapshot = session.snapshot();
        *state = SessionState::Connected(session);

        tracing::info!(
            session_id = %snapshot.session_id,
            provider = %snapshot.provider,
            account = %snapshot.account,
            chain_id = snapshot.chain_id,
            network = %snapshot.network_label(),
            "Wallet session established"
        );
        Ok(snapshot)
    }

    /// End the session. Wallet-side teardown is best effort and bounded by
    /// the teardown timeout; local state is reset before it starts, so readers
    /// see `Disconnected` even while the wallet is still answering. Returns
    /// false when there was nothing to disconnect.
    pub async fn disconnect(&self) -> bool {
        let session = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, SessionState::Disconnected) {
                SessionState::Connected(session) => session,
                SessionState::Disconnected => {
                    tracing::debug!("Disconnect requested while already disconnected");
                    return false;
                }
            }
        };
        let session_id = session.session_id;

        if let Some(cache) = self.platform.cache() {
            if let Err(e) = cache.clear().await {
                tracing::warn!(error = %e, "Could not clear cached wallet provider");
            }
        }

        if session.capabilities.disconnect {
            let teardown =
                tokio::time::timeout(self.teardown_timeout, session.transport.disconnect()).await;
            let failure = match teardown {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(Error::TransportTeardown(e.to_string())),
                Err(_) => Some(Error::TransportTeardown(format!(
                    "no answer within {:?}",
                    self.teardown_timeout
                ))),
            };
            if let Some(err) = failure {
                tracing::warn!(session_id = %session_id, error = %err, "Ignoring transport teardown failure");
            }
        }

        // Unsubscribes
        drop(session);

        tracing::info!(session_id = %session_id, "Wallet session ended");
        true
    }

    /// The wallet switched accounts. `None` (no accounts left) ends the session.
    pub async fn account_changed(&self, account: Option<Address>) {
        let Some(account) = account else {
            tracing::info!("Wallet reported no authorized accounts, disconnecting");
            self.disconnect().await;
            return;
        };

        let mut state = self.state.lock().await;
        match &mut *state {
            SessionState::Connected(session) => {
                tracing::info!(
                    session_id = %session.session_id,
                    from = %session.account,
                    to = %account,
                    "Wallet account changed"
                );
                session.account = account;
            }
            SessionState::Disconnected => {
                tracing::debug!(account = %account, "Account change without a session, ignoring");
            }
        }
    }

    /// The wallet switched networks: reload the application
    pub fn chain_changed(&self) {
        tracing::info!("Wallet network changed, reloading");
        self.platform.reload();
    }

    /// Apply one bridged event if it belongs to the active session.
    /// Returns whether a transition was applied.
    pub async fn handle_event(&self, event: BridgeEvent) -> bool {
        let active = match &*self.state.lock().await {
            SessionState::Connected(session) => Some(session.generation),
            SessionState::Disconnected => None,
        };
        if active != Some(event.generation) {
            tracing::debug!(
                kind = %event.event.kind(),
                generation = event.generation,
                "Dropping wallet event from an ended session"
            );
            return false;
        }

        match translate(&event.event) {
            SessionAction::SetAccount(account) => self.account_changed(Some(account)).await,
            SessionAction::Disconnect => {
                self.disconnect().await;
            }
            SessionAction::Reload => self.chain_changed(),
            SessionAction::Ignore => return false,
        }
        true
    }

    /// Apply every queued wallet event, in order. Returns transitions applied.
    ///
    /// Returns 0 without draining while [`run_events`](Self::run_events) owns
    /// the queue.
    pub async fn process_pending(&self) -> usize {
        let Ok(mut events) = self.events.try_lock() else {
            tracing::debug!("Event queue is being drained by run_events");
            return 0;
        };
        let mut applied = 0;
        while let Ok(event) = events.try_recv() {
            if self.handle_event(event).await {
                applied += 1;
            }
        }
        applied
    }

    /// Apply wallet events as they arrive. Runs until the future is dropped,
    /// owning the event queue for that long.
    pub async fn run_events(&self) {
        let mut events = self.events.lock().await;
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("platform", &self.platform)
            .field("connecting", &self.is_connecting())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::{registry, MockFactory};
    use crate::provider::{FixedPicker, MemoryCache, ProviderCache, ProviderChoice, ProviderPicker};
    use crate::transport::mock::{MockTransport, ACCOUNT_A, ACCOUNT_B};
    use crate::transport::{ProviderRpcError, WalletEvent};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;
    use tokio_test::{assert_pending, assert_ready};

    struct Harness {
        store: SessionStore,
        factory: Arc<MockFactory>,
        cache: Arc<MemoryCache>,
        reloads: Arc<AtomicUsize>,
    }

    fn harness_with(picker: Arc<dyn ProviderPicker>, cache: MemoryCache) -> Harness {
        let factory = Arc::new(MockFactory::default());
        let cache = Arc::new(cache);
        let reloads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reloads);
        let platform = Platform::new(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .with_cache(Arc::clone(&cache) as Arc<dyn ProviderCache>);
        let selector = ProviderSelector::new(Arc::new(registry(Arc::clone(&factory))), picker);
        Harness {
            store: SessionStore::new(selector, platform),
            factory,
            cache,
            reloads,
        }
    }

    fn harness(pick: &str) -> Harness {
        harness_with(Arc::new(FixedPicker::new(pick)), MemoryCache::new())
    }

    fn account(raw: &str) -> Address {
        parse_account(raw).unwrap()
    }

    /// Picker that blocks until released, so a connect can be held open
    struct GatedPicker {
        gate: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProviderPicker for GatedPicker {
        async fn pick(&self, _choices: &[ProviderChoice]) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Some("injected".to_string())
        }
    }

    struct CountingPicker(AtomicUsize);

    #[async_trait]
    impl ProviderPicker for CountingPicker {
        async fn pick(&self, _choices: &[ProviderChoice]) -> Option<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Some("walletconnect".to_string())
        }
    }

    #[tokio::test]
    async fn test_connect_establishes_session() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected"));
        h.factory.push(Arc::clone(&mock));

        let outcome = h.store.connect().await.unwrap();
        let snapshot = outcome.snapshot().unwrap().clone();

        assert_eq!(snapshot.provider, "injected");
        assert_eq!(snapshot.account, account(ACCOUNT_A));
        assert_eq!(snapshot.chain_id, 56);
        assert_eq!(snapshot.network_label(), "Binance Smart Chain");
        assert!(h.store.is_connected().await);
        assert!(!h.store.is_connecting());
        assert_eq!(h.store.snapshot().await, Some(snapshot));
        assert_eq!(h.cache.load().await.unwrap(), Some("injected".to_string()));
        assert_eq!(mock.listener_count(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_connect_leaves_store_untouched() {
        let h = harness_with(Arc::new(FixedPicker::cancelled()), MemoryCache::new());

        let err = h.store.connect().await.unwrap_err();

        assert!(err.is_user_cancelled());
        assert!(!h.store.is_connected().await);
        assert!(!h.store.is_connecting());
        assert_eq!(h.cache.load().await.unwrap(), None);
        assert_eq!(h.factory.created(), 0);
    }

    #[tokio::test]
    async fn test_connect_without_accounts_fails() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected").with_accounts(&[]));
        h.factory.push(Arc::clone(&mock));

        let err = h.store.connect().await.unwrap_err();

        assert!(matches!(err, Error::NoAccount));
        assert!(!h.store.is_connected().await);
        assert_eq!(h.cache.load().await.unwrap(), None);
        assert_eq!(mock.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_network_failure_keeps_previous_session() {
        let h = harness("injected");
        h.store.connect().await.unwrap();
        let before = h.store.snapshot().await.unwrap();

        h.factory
            .push(Arc::new(MockTransport::new("injected").with_chain_id(None)));
        let err = h.store.connect().await.unwrap_err();

        assert!(matches!(err, Error::NetworkQuery(_)));
        assert_eq!(h.store.snapshot().await, Some(before));
    }

    #[tokio::test]
    async fn test_transport_init_failure_is_retryable() {
        let h = harness("walletconnect");
        h.factory.fail_next("relay unreachable");

        let err = h.store.connect().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!h.store.is_connecting());

        // Flag was released, so a retry goes through
        assert!(h.store.connect().await.unwrap().snapshot().is_some());
    }

    #[tokio::test]
    async fn test_disconnect_runs_every_step() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected"));
        h.factory.push(Arc::clone(&mock));
        h.store.connect().await.unwrap();

        assert!(h.store.disconnect().await);

        assert!(!h.store.is_connected().await);
        assert_eq!(h.store.account().await, None);
        assert_eq!(h.store.chain_id().await, None);
        assert_eq!(h.cache.load().await.unwrap(), None);
        assert_eq!(mock.disconnect_calls(), 1);
        assert_eq!(mock.listener_count(), 0);
        assert_eq!(mock.removed_listeners(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_noop() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected"));
        h.factory.push(Arc::clone(&mock));
        h.store.connect().await.unwrap();

        assert!(h.store.disconnect().await);
        h.cache.store("injected").await.unwrap();
        assert!(!h.store.disconnect().await);

        assert_eq!(mock.disconnect_calls(), 1);
        assert_eq!(mock.removed_listeners(), 3);
        // Nothing to end, so the cache is left alone
        assert_eq!(h.cache.load().await.unwrap(), Some("injected".to_string()));
    }

    #[tokio::test]
    async fn test_teardown_failure_still_resets() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected").failing_disconnect());
        h.factory.push(Arc::clone(&mock));
        h.store.connect().await.unwrap();

        assert!(h.store.disconnect().await);

        assert_eq!(mock.disconnect_calls(), 1);
        assert!(!h.store.is_connected().await);
        assert_eq!(mock.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_hanging_teardown_is_bounded() {
        let h = harness("injected");
        let store = h.store.with_teardown_timeout(Duration::from_millis(50));
        let mock = Arc::new(MockTransport::new("injected").hanging_disconnect());
        h.factory.push(Arc::clone(&mock));
        store.connect().await.unwrap();

        let finished = tokio::time::timeout(Duration::from_secs(5), store.disconnect()).await;

        assert_eq!(finished.ok(), Some(true));
        assert!(!store.is_connected().await);
        assert_eq!(mock.disconnect_calls(), 1);
        assert_eq!(mock.listener_count(), 0);
        assert_eq!(h.cache.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_abandoned_disconnect_leaves_consistent_state() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected").hanging_disconnect());
        h.factory.push(Arc::clone(&mock));
        h.store.connect().await.unwrap();

        let mut teardown = tokio_test::task::spawn(h.store.disconnect());
        assert_pending!(teardown.poll());
        assert_eq!(mock.disconnect_calls(), 1);

        // Readers are not blocked by the wallet
        assert!(!h.store.is_connected().await);
        assert_eq!(h.store.snapshot().await, None);

        drop(teardown);
        assert_eq!(mock.listener_count(), 0);
        assert_eq!(mock.removed_listeners(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_skips_missing_capability() {
        let h = harness("injected");
        let caps = TransportCapabilities {
            events: true,
            remove_listener: true,
            disconnect: false,
        };
        let mock = Arc::new(MockTransport::new("injected").with_capabilities(caps));
        h.factory.push(Arc::clone(&mock));
        h.store.connect().await.unwrap();

        assert!(h.store.disconnect().await);
        assert_eq!(mock.disconnect_calls(), 0);
        assert_eq!(mock.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_second_connect_while_pending_is_ignored() {
        let picker = Arc::new(GatedPicker {
            gate: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let h = harness_with(
            Arc::clone(&picker) as Arc<dyn ProviderPicker>,
            MemoryCache::new(),
        );

        let mut first = tokio_test::task::spawn(h.store.connect());
        assert_pending!(first.poll());
        assert!(h.store.is_connecting());

        assert_eq!(h.store.connect().await.unwrap(), ConnectOutcome::InFlight);
        assert_eq!(picker.calls.load(Ordering::SeqCst), 1);

        picker.gate.notify_one();
        let outcome = assert_ready!(first.poll()).unwrap();
        assert!(outcome.snapshot().is_some());
        assert!(!h.store.is_connecting());
        assert_eq!(h.factory.created(), 1);
    }

    #[tokio::test]
    async fn test_accounts_changed_updates_account() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected"));
        h.factory.push(Arc::clone(&mock));
        let snapshot = h.store.connect().await.unwrap().snapshot().unwrap().clone();

        mock.emit(WalletEvent::AccountsChanged(vec![ACCOUNT_B.to_string()]));
        assert_eq!(h.store.process_pending().await, 1);

        let current = h.store.snapshot().await.unwrap();
        assert_eq!(current.account, account(ACCOUNT_B));
        assert_eq!(current.chain_id, snapshot.chain_id);
        assert_eq!(current.session_id, snapshot.session_id);
    }

    #[tokio::test]
    async fn test_empty_accounts_disconnects() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected"));
        h.factory.push(Arc::clone(&mock));
        h.store.connect().await.unwrap();

        mock.emit(WalletEvent::AccountsChanged(vec![]));
        h.store.process_pending().await;

        assert!(!h.store.is_connected().await);
        assert_eq!(h.cache.load().await.unwrap(), None);
        assert_eq!(mock.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn test_chain_changed_reloads_once() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected"));
        h.factory.push(Arc::clone(&mock));
        h.store.connect().await.unwrap();

        mock.emit(WalletEvent::ChainChanged("0x1".to_string()));
        h.store.process_pending().await;

        assert_eq!(h.reloads.load(Ordering::SeqCst), 1);
        // Reload restarts the host; the store itself keeps the old chain
        assert_eq!(h.store.chain_id().await, Some(56));
    }

    #[tokio::test]
    async fn test_disconnect_event_ends_session() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected"));
        h.factory.push(Arc::clone(&mock));
        h.store.connect().await.unwrap();

        mock.emit(WalletEvent::Disconnect(ProviderRpcError {
            code: 4900,
            message: "closed".to_string(),
        }));
        h.store.process_pending().await;

        assert!(!h.store.is_connected().await);
        assert_eq!(mock.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn test_events_after_disconnect_do_nothing() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected"));
        h.factory.push(Arc::clone(&mock));
        h.store.connect().await.unwrap();
        h.store.disconnect().await;

        assert_eq!(
            mock.emit(WalletEvent::AccountsChanged(vec![ACCOUNT_B.to_string()])),
            0
        );
        mock.emit(WalletEvent::ChainChanged("0x1".to_string()));
        assert_eq!(h.store.process_pending().await, 0);

        assert!(!h.store.is_connected().await);
        assert_eq!(h.reloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_events_dropped_when_listeners_cannot_be_removed() {
        let h = harness("injected");
        let caps = TransportCapabilities {
            events: true,
            remove_listener: false,
            disconnect: true,
        };
        let old = Arc::new(MockTransport::new("injected").with_capabilities(caps));
        h.factory.push(Arc::clone(&old));
        h.store.connect().await.unwrap();
        h.store.disconnect().await;
        h.store.connect().await.unwrap();
        let current = h.store.snapshot().await.unwrap();

        // Handlers are still installed on the old transport
        assert_eq!(old.emit(WalletEvent::AccountsChanged(vec![])), 1);
        old.emit(WalletEvent::ChainChanged("0x1".to_string()));
        assert_eq!(h.store.process_pending().await, 0);

        assert_eq!(h.store.snapshot().await, Some(current));
        assert_eq!(h.reloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transport_without_events_still_connects() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected").with_capabilities(TransportCapabilities::NONE));
        h.factory.push(Arc::clone(&mock));

        let snapshot = h.store.connect().await.unwrap().snapshot().unwrap().clone();
        assert_eq!(snapshot.capabilities, TransportCapabilities::NONE);
        assert_eq!(mock.listener_count(), 0);

        assert!(h.store.disconnect().await);
        assert_eq!(mock.disconnect_calls(), 0);
        assert_eq!(h.cache.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reconnect_uses_cached_provider_without_picker() {
        let picker = Arc::new(CountingPicker(AtomicUsize::new(0)));
        let h = harness_with(
            Arc::clone(&picker) as Arc<dyn ProviderPicker>,
            MemoryCache::with_value("injected"),
        );

        let snapshot = h.store.reconnect_if_cached().await.unwrap();

        assert_eq!(snapshot.provider, "injected");
        assert_eq!(snapshot.chain_id, 56);
        assert_eq!(picker.0.load(Ordering::SeqCst), 0);
        assert!(h.store.is_connected().await);
    }

    #[tokio::test]
    async fn test_reconnect_failure_is_silent() {
        let h = harness_with(
            Arc::new(FixedPicker::cancelled()),
            MemoryCache::with_value("walletconnect"),
        );
        h.factory.fail_next("relay unreachable");

        assert!(h.store.reconnect_if_cached().await.is_none());
        assert!(!h.store.is_connected().await);
        assert!(!h.store.is_connecting());
        assert_eq!(h.cache.load().await.unwrap(), Some("walletconnect".to_string()));
    }

    #[tokio::test]
    async fn test_reconnect_with_unknown_cached_name() {
        let h = harness_with(
            Arc::new(FixedPicker::cancelled()),
            MemoryCache::with_value("metamask-legacy"),
        );

        assert!(h.store.reconnect_if_cached().await.is_none());
        assert_eq!(h.factory.created(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_without_cache_entry_or_platform_cache() {
        let h = harness("injected");
        assert!(h.store.reconnect_if_cached().await.is_none());

        let selector = ProviderSelector::new(
            Arc::new(registry(Arc::new(MockFactory::default()))),
            Arc::new(FixedPicker::new("injected")),
        );
        let store = SessionStore::new(selector, Platform::headless());
        assert!(store.reconnect_if_cached().await.is_none());

        // Without a platform cache the session still works, just unpersisted
        assert!(store.connect().await.unwrap().snapshot().is_some());
        assert!(store.disconnect().await);
    }

    #[tokio::test]
    async fn test_connect_replaces_previous_session() {
        let h = harness("injected");
        let first = Arc::new(MockTransport::new("injected"));
        let second = Arc::new(MockTransport::new("injected").with_accounts(&[ACCOUNT_B]));
        h.factory.push(Arc::clone(&first));
        h.factory.push(Arc::clone(&second));

        let a = h.store.connect().await.unwrap().snapshot().unwrap().clone();
        let b = h.store.connect().await.unwrap().snapshot().unwrap().clone();

        assert_ne!(a.session_id, b.session_id);
        assert_eq!(b.account, account(ACCOUNT_B));
        assert_eq!(first.listener_count(), 0);
        assert_eq!(first.disconnect_calls(), 0);
        assert_eq!(second.listener_count(), 3);

        // Only the new transport drives the store
        first.emit(WalletEvent::AccountsChanged(vec![]));
        assert_eq!(h.store.process_pending().await, 0);
        assert!(h.store.is_connected().await);
    }

    #[tokio::test]
    async fn test_alternating_connect_disconnect() {
        let h = harness("injected");
        let mut transports = Vec::new();
        for _ in 0..5 {
            let mock = Arc::new(MockTransport::new("injected"));
            h.factory.push(Arc::clone(&mock));
            transports.push(mock);
        }

        for mock in &transports {
            assert!(h.store.connect().await.unwrap().snapshot().is_some());
            assert_eq!(mock.listener_count(), 3);
            assert!(h.store.disconnect().await);
            assert_eq!(mock.listener_count(), 0);
            assert_eq!(mock.disconnect_calls(), 1);
        }

        assert!(!h.store.is_connected().await);
        assert_eq!(h.cache.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_events_applies_as_they_arrive() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected"));
        h.factory.push(Arc::clone(&mock));
        h.store.connect().await.unwrap();

        let mut runner = tokio_test::task::spawn(h.store.run_events());
        assert_pending!(runner.poll());

        mock.emit(WalletEvent::AccountsChanged(vec![ACCOUNT_B.to_string()]));
        assert!(runner.is_woken());
        assert_pending!(runner.poll());
        drop(runner);

        assert_eq!(h.store.account().await, Some(account(ACCOUNT_B)));
    }

    #[tokio::test]
    async fn test_process_pending_yields_to_run_events() {
        let h = harness("injected");
        let mock = Arc::new(MockTransport::new("injected"));
        h.factory.push(Arc::clone(&mock));
        h.store.connect().await.unwrap();

        let mut runner = tokio_test::task::spawn(h.store.run_events());
        assert_pending!(runner.poll());

        mock.emit(WalletEvent::AccountsChanged(vec![ACCOUNT_B.to_string()]));
        assert_eq!(h.store.process_pending().await, 0);

        assert_pending!(runner.poll());
        drop(runner);
        assert_eq!(h.store.account().await, Some(account(ACCOUNT_B)));
    }

    #[test]
    fn test_short_account() {
        let snapshot = SessionSnapshot {
            session_id: Uuid::nil(),
            provider: "injected".to_string(),
            account: account(ACCOUNT_A),
            chain_id: 1,
            connected_at: Utc::now(),
            capabilities: TransportCapabilities::ALL,
        };
        let short = snapshot.short_account();
        assert!(short.starts_with("0x00000000..."));
        assert_eq!(short.len(), 23);
        assert!(short.to_lowercase().ends_with("00000abc01"));
        assert_eq!(snapshot.network_label(), "Ethereum Mainnet");
    }
}
