//! Host capabilities handed to the session store at construction
//!
//! What differs between a browser tab, a desktop shell and a CLI is passed in
//! explicitly: whether there is somewhere to persist the preferred provider,
//! and what "reload the application" means.

use crate::provider::ProviderCache;
use std::sync::Arc;

/// Restarts the client application after the wallet switched networks
pub trait Reloader: Send + Sync {
    fn reload(&self);
}

impl<F> Reloader for F
where
    F: Fn() + Send + Sync,
{
    fn reload(&self) {
        self()
    }
}

/// Reloader for hosts that cannot restart themselves
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReload;

impl Reloader for LogReload {
    fn reload(&self) {
        tracing::warn!("Wallet switched networks; network-dependent state must be reloaded");
    }
}

#[derive(Clone)]
pub struct Platform {
    cache: Option<Arc<dyn ProviderCache>>,
    reloader: Arc<dyn Reloader>,
}

impl Platform {
    /// Host without persistent storage
    pub fn new(reloader: Arc<dyn Reloader>) -> Self {
        Self {
            cache: None,
            reloader,
        }
    }

    /// No storage, reload only logged
    pub fn headless() -> Self {
        Self::new(Arc::new(LogReload))
    }

    /// Persist the preferred provider through `cache`
    pub fn with_cache(mut self, cache: Arc<dyn ProviderCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&Arc<dyn ProviderCache>> {
        self.cache.as_ref()
    }

    pub fn reload(&self) {
        self.reloader.reload();
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("persistent_cache", &self.cache.is_some())
            .finish()
    }
}
