//! Storage backend selection.

use serde::Deserialize;
use std::path::PathBuf;

use crate::moderation::ModerationConfig;
use crate::storage::ModuleDescriptor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Modules and moderation rows live in this config file and are
    /// re-read on every fetch.
    #[default]
    File,
    /// SQLite database managed with migrations.
    Sqlite,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Database path for the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,
    #[serde(default)]
    pub moderation: Vec<ModerationConfig>,
}
