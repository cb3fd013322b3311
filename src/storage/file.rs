//! Storage backed by the relay's own TOML config file.

use async_trait::async_trait;
use std::path::PathBuf;

use super::{ModuleDescriptor, Storage, StorageError};
use crate::config::{AiConfig, Config, IrcConfig};
use crate::moderation::ModerationConfig;

/// Re-reads the file on every call so operator edits show up on the next
/// reload without restarting.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> Result<Config, StorageError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(crate::config::ConfigError::from)?;
        Ok(Config::parse(&content)?)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn enabled_modules(&self) -> Result<Vec<ModuleDescriptor>, StorageError> {
        let config = self.read().await?;
        Ok(config.storage.modules.into_iter().filter(|m| m.enabled).collect())
    }

    async fn module(&self, id: i64) -> Result<Option<ModuleDescriptor>, StorageError> {
        let config = self.read().await?;
        Ok(config.storage.modules.into_iter().find(|m| m.id == id))
    }

    async fn moderation_configs(&self) -> Result<Vec<ModerationConfig>, StorageError> {
        Ok(self.read().await?.storage.moderation)
    }

    async fn connection_settings(&self) -> Result<IrcConfig, StorageError> {
        Ok(self.read().await?.irc)
    }

    async fn ai_settings(&self) -> Result<AiConfig, StorageError> {
        Ok(self.read().await?.ai)
    }
}
