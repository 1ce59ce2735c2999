//! Wallet Session
//!
//! Connects a client application to an Ethereum-compatible wallet and keeps
//! one authoritative session in sync with it:
//! - Offers a registry of wallet providers and lets the user pick one
//! - Derives account and chain from the wallet on every connect
//! - Remembers the chosen provider and reconnects silently on restart
//! - Follows account switches, network switches and wallet-side disconnects
//!
//! # Architecture
//!
//! - [`provider`]: registry, selection and provider cache
//! - [`transport`]: the EIP-1193 style seam every wallet sits behind
//! - [`session`]: adapter, event bridge and the [`SessionStore`] state machine
//! - [`platform`]: host capabilities (persistence, reload) passed in explicitly

pub mod chains;
pub mod config;
pub mod platform;
pub mod provider;
pub mod session;
pub mod transport;

mod error;

pub use config::{Config, Network, ProviderConfig, RpcConfig, TransportConfig, INFURA_ID_ENV};
pub use error::{Error, Result};
pub use platform::{LogReload, Platform, Reloader};
pub use provider::{
    FileCache, FixedPicker, MemoryCache, ProviderCache, ProviderChoice, ProviderPicker,
    ProviderRegistry, ProviderSelector,
};
pub use session::{ConnectOutcome, SessionSnapshot, SessionStore};
pub use transport::{TransportCapabilities, WalletEvent, WalletEventKind, WalletTransport};
