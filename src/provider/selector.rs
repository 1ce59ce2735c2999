//! Provider selection
//!
//! Presents the registry through a [`ProviderPicker`] (a modal, a terminal
//! prompt, a fixed choice) and turns the chosen name into a connected transport.

use super::ProviderRegistry;
use crate::config::ProviderDisplay;
use crate::transport::WalletTransport;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// One selectable provider as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderChoice {
    pub name: String,
    pub kind: &'static str,
    pub display: ProviderDisplay,
}

/// Asks the user which provider to connect with
#[async_trait]
pub trait ProviderPicker: Send + Sync {
    /// Registry name of the chosen provider, or `None` if the user dismissed the list
    async fn pick(&self, choices: &[ProviderChoice]) -> Option<String>;
}

/// Picker that always answers with the same name
#[derive(Debug, Clone)]
pub struct FixedPicker(Option<String>);

impl FixedPicker {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Some(name.into()))
    }

    /// Picker that behaves like a dismissed dialog
    pub fn cancelled() -> Self {
        Self(None)
    }
}

#[async_trait]
impl ProviderPicker for FixedPicker {
    async fn pick(&self, _choices: &[ProviderChoice]) -> Option<String> {
        self.0.clone()
    }
}

/// Transport produced by a selection, with the registry name it came from
pub struct Selected {
    pub provider: String,
    pub transport: Arc<dyn WalletTransport>,
}

impl std::fmt::Debug for Selected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selected")
            .field("provider", &self.provider)
            .field("capabilities", &self.transport.capabilities())
            .finish()
    }
}

pub struct ProviderSelector {
    registry: Arc<ProviderRegistry>,
    picker: Arc<dyn ProviderPicker>,
}

impl ProviderSelector {
    pub fn new(registry: Arc<ProviderRegistry>, picker: Arc<dyn ProviderPicker>) -> Self {
        Self { registry, picker }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Let the user choose, then instantiate the chosen transport
    pub async fn select(&self) -> Result<Selected> {
        let choices = self.registry.choices();
        let name = self.picker.pick(&choices).await.ok_or(Error::UserCancelled)?;
        tracing::debug!(provider = %name, "User selected wallet provider");
        self.select_named(&name).await
    }

    /// Instantiate a provider without asking (cached reconnect)
    pub async fn select_named(&self, name: &str) -> Result<Selected> {
        let transport = self.registry.instantiate(name).await?;
        Ok(Selected {
            provider: name.to_string(),
            transport,
        })
    }
}
