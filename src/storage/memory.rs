//! In-process storage.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{ModuleDescriptor, Storage, StorageError};
use crate::config::{AiConfig, IrcConfig};
use crate::moderation::ModerationConfig;

/// Storage held in memory; mutate it to simulate operator edits.
#[derive(Debug)]
pub struct MemoryStorage {
    connection: RwLock<IrcConfig>,
    ai: RwLock<AiConfig>,
    modules: RwLock<Vec<ModuleDescriptor>>,
    moderation: RwLock<Vec<ModerationConfig>>,
}

impl MemoryStorage {
    pub fn new(connection: IrcConfig) -> Self {
        Self {
            connection: RwLock::new(connection),
            ai: RwLock::new(AiConfig::default()),
            modules: RwLock::new(Vec::new()),
            moderation: RwLock::new(Vec::new()),
        }
    }

    pub fn set_connection(&self, connection: IrcConfig) {
        *self.connection.write() = connection;
    }

    pub fn set_ai(&self, ai: AiConfig) {
        *self.ai.write() = ai;
    }

    /// Insert or replace a module by id.
    pub fn put_module(&self, module: ModuleDescriptor) {
        let mut modules = self.modules.write();
        match modules.iter_mut().find(|m| m.id == module.id) {
            Some(slot) => *slot = module,
            None => modules.push(module),
        }
    }

    pub fn remove_module(&self, id: i64) {
        self.modules.write().retain(|m| m.id != id);
    }

    pub fn set_moderation(&self, configs: Vec<ModerationConfig>) {
        *self.moderation.write() = configs;
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn enabled_modules(&self) -> Result<Vec<ModuleDescriptor>, StorageError> {
        Ok(self.modules.read().iter().filter(|m| m.enabled).cloned().collect())
    }

    async fn module(&self, id: i64) -> Result<Option<ModuleDescriptor>, StorageError> {
        Ok(self.modules.read().iter().find(|m| m.id == id).cloned())
    }

    async fn moderation_configs(&self) -> Result<Vec<ModerationConfig>, StorageError> {
        Ok(self.moderation.read().clone())
    }

    async fn connection_settings(&self) -> Result<IrcConfig, StorageError> {
        Ok(self.connection.read().clone())
    }

    async fn ai_settings(&self) -> Result<AiConfig, StorageError> {
        Ok(self.ai.read().clone())
    }
}
