//! Persistent records the session reads: plugin module descriptors,
//! per-channel moderation settings, connection and AI settings.
//!
//! Backends:
//! - [`FileStorage`]: the TOML config file, re-read on every fetch
//! - [`SqliteStorage`]: SQLx-managed SQLite with embedded migrations
//! - [`MemoryStorage`]: in-process, for tests and embedding

mod file;
mod memory;
mod sqlite;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::defaults::default_true;
use crate::config::{AiConfig, ConfigError, IrcConfig};
use crate::moderation::ModerationConfig;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("config file error: {0}")]
    Config(#[from] ConfigError),
    #[error("no {0} stored")]
    NotFound(&'static str),
    #[error("invalid stored value: {0}")]
    Invalid(String),
}

impl StorageError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Sqlx(_) => "database",
            Self::Migration(_) => "migration",
            Self::Config(e) => e.error_code(),
            Self::NotFound(_) => "not_found",
            Self::Invalid(_) => "invalid_value",
        }
    }
}

/// A stored plugin module.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModuleDescriptor {
    pub id: i64,
    pub name: String,
    /// Command word, e.g. `!coffee`. Normalized on load.
    pub trigger: String,
    /// Catalog entry that constructs the handler.
    pub kind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Free-form per-module settings handed to the constructor.
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl ModuleDescriptor {
    pub fn new(id: i64, name: &str, trigger: &str, kind: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            trigger: trigger.to_string(),
            kind: kind.to_string(),
            enabled: true,
            settings: serde_json::Value::Null,
        }
    }
}

/// Read side of the relay's persistent configuration.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Enabled modules in load order.
    async fn enabled_modules(&self) -> Result<Vec<ModuleDescriptor>, StorageError>;

    /// One module by id, enabled or not.
    async fn module(&self, id: i64) -> Result<Option<ModuleDescriptor>, StorageError>;

    async fn moderation_configs(&self) -> Result<Vec<ModerationConfig>, StorageError>;

    async fn connection_settings(&self) -> Result<IrcConfig, StorageError>;

    async fn ai_settings(&self) -> Result<AiConfig, StorageError>;
}
