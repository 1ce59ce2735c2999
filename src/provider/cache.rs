//! Preferred-provider persistence
//!
//! Holds the single "was connected with X" value that lets a restarted client
//! reconnect without showing the provider list again.

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;

#[async_trait]
pub trait ProviderCache: Send + Sync {
    async fn load(&self) -> Result<Option<String>>;
    async fn store(&self, provider: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Cache that lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryCache {
    value: RwLock<Option<String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(provider: &str) -> Self {
        Self {
            value: RwLock::new(Some(provider.to_string())),
        }
    }
}

#[async_trait]
impl ProviderCache for MemoryCache {
    async fn load(&self) -> Result<Option<String>> {
        Ok(self.value.read().await.clone())
    }

    async fn store(&self, provider: &str) -> Result<()> {
        *self.value.write().await = Some(provider.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.value.write().await = None;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    cached_provider: String,
    updated_at: DateTime<Utc>,
}

/// Cache persisted as a small JSON file
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl ProviderCache for FileCache {
    async fn load(&self) -> Result<Option<String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: CacheRecord = serde_json::from_str(&content)
            .map_err(|e| Error::Cache(format!("{}: {}", self.path.display(), e)))?;
        Ok(Some(record.cached_provider))
    }

    async fn store(&self, provider: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let record = CacheRecord {
            cached_provider: provider.to_string(),
            updated_at: Utc::now(),
        };
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(&record)?).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
