use std::collections::HashMap;
use std::sync::Arc;

use super::{Plugin, PluginSender, builtin};
use crate::error::PluginError;
use crate::storage::ModuleDescriptor;

/// Builds a handler instance for one descriptor.
pub type Constructor =
    Arc<dyn Fn(&ModuleDescriptor, PluginSender) -> Result<Box<dyn Plugin>, PluginError> + Send + Sync>;

/// Maps descriptor kinds to constructors.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    constructors: HashMap<String, Constructor>,
}

impl PluginCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in handlers registered.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register("echo", builtin::echo::construct);
        catalog.register("coffee", builtin::coffee::construct);
        catalog.register("url_title", builtin::url_title::construct);
        catalog
    }

    /// Add or replace a kind.
    pub fn register<F>(&mut self, kind: &str, constructor: F)
    where
        F: Fn(&ModuleDescriptor, PluginSender) -> Result<Box<dyn Plugin>, PluginError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(kind.to_ascii_lowercase(), Arc::new(constructor));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(&kind.to_ascii_lowercase())
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn construct(
        &self,
        descriptor: &ModuleDescriptor,
        sender: PluginSender,
    ) -> Result<Box<dyn Plugin>, PluginError> {
        let constructor = self
            .constructors
            .get(&descriptor.kind.to_ascii_lowercase())
            .ok_or_else(|| PluginError::UnknownKind(descriptor.kind.clone()))?;
        constructor(descriptor, sender)
    }
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn builtin_kinds() {
        let catalog = PluginCatalog::builtin();
        assert_eq!(catalog.kinds(), vec!["coffee", "echo", "url_title"]);
        assert!(catalog.contains("ECHO"));
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let descriptor = ModuleDescriptor::new(1, "Mystery", "!x", "python");
        let err = PluginCatalog::builtin()
            .construct(&descriptor, PluginSender::new(1, tx))
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "unknown_kind");
    }
}
