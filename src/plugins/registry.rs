//! Loaded handler instances and trigger dispatch.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{Plugin, PluginCatalog, PluginOutput, PluginSender};
use crate::error::PluginError;
use crate::metrics;
use crate::storage::ModuleDescriptor;
use crate::telemetry::spans;

/// Reply sent to the channel when a command handler fails.
pub const COMMAND_FAILED_REPLY: &str = "Error executing command.";

/// Characters that mark a message as a command.
pub const COMMAND_PREFIXES: &[char] = &['!', '@', '#'];

/// Dispatch key for a stored trigger: leading prefix characters stripped,
/// lower-cased.
pub fn normalize_trigger(trigger: &str) -> String {
    trigger
        .trim()
        .trim_start_matches(COMMAND_PREFIXES)
        .to_lowercase()
}

/// Split a command line into `(command, args)`.
///
/// `None` when the text does not start with a prefix character or has no
/// command word after it.
pub fn parse_command(text: &str) -> Option<(String, Vec<String>)> {
    if !text.starts_with(COMMAND_PREFIXES) {
        return None;
    }
    let mut words = text.split_whitespace();
    let command = normalize_trigger(words.next()?);
    if command.is_empty() {
        return None;
    }
    Some((command, words.map(str::to_string).collect()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

struct LoadedPlugin {
    descriptor: ModuleDescriptor,
    trigger: String,
    instance: Box<dyn Plugin>,
}

impl LoadedPlugin {
    /// Run one handler call with panics converted to errors.
    fn call<F>(&mut self, stage: &'static str, f: F) -> Result<(), PluginError>
    where
        F: FnOnce(&mut dyn Plugin) -> Result<(), PluginError>,
    {
        let span = spans::plugin(self.descriptor.id, &self.descriptor.name, stage);
        let _enter = span.enter();

        let instance = self.instance.as_mut();
        let outcome = catch_unwind(AssertUnwindSafe(|| f(instance)))
            .unwrap_or_else(|payload| Err(PluginError::Panicked(panic_message(payload.as_ref()))));

        if let Err(e) = &outcome {
            error!(
                module_id = self.descriptor.id,
                module = %self.descriptor.name,
                stage,
                code = e.error_code(),
                error = %e,
                "Plugin failed"
            );
            metrics::record_plugin_failure(stage);
        }
        outcome
    }
}

/// The set of loaded handlers.
///
/// Owned by the session actor. Instances are kept in load order; the
/// trigger table maps a normalized trigger to the module that answers it.
pub struct PluginRegistry {
    catalog: PluginCatalog,
    outputs: mpsc::UnboundedSender<PluginOutput>,
    loaded: Vec<LoadedPlugin>,
    triggers: HashMap<String, i64>,
}

impl PluginRegistry {
    pub fn new(catalog: PluginCatalog, outputs: mpsc::UnboundedSender<PluginOutput>) -> Self {
        Self {
            catalog,
            outputs,
            loaded: Vec::new(),
            triggers: HashMap::new(),
        }
    }

    fn construct(&self, descriptor: &ModuleDescriptor) -> Result<LoadedPlugin, PluginError> {
        let sender = PluginSender::new(descriptor.id, self.outputs.clone());
        let instance = catch_unwind(AssertUnwindSafe(|| self.catalog.construct(descriptor, sender)))
            .unwrap_or_else(|payload| Err(PluginError::Panicked(panic_message(payload.as_ref()))))?;
        Ok(LoadedPlugin {
            descriptor: descriptor.clone(),
            trigger: normalize_trigger(&descriptor.trigger),
            instance,
        })
    }

    fn construct_logged(&self, descriptor: &ModuleDescriptor) -> Option<LoadedPlugin> {
        match self.construct(descriptor) {
            Ok(plugin) => Some(plugin),
            Err(e) => {
                error!(
                    module_id = descriptor.id,
                    module = %descriptor.name,
                    kind = %descriptor.kind,
                    code = e.error_code(),
                    error = %e,
                    "Failed to load module"
                );
                metrics::record_plugin_failure("load");
                None
            }
        }
    }

    fn rebuild_triggers(&mut self) {
        self.triggers.clear();
        for plugin in &self.loaded {
            if plugin.trigger.is_empty() {
                continue;
            }
            if let Some(previous) = self.triggers.insert(plugin.trigger.clone(), plugin.descriptor.id)
                && previous != plugin.descriptor.id
            {
                warn!(
                    trigger = %plugin.trigger,
                    replaced = previous,
                    module_id = plugin.descriptor.id,
                    "Duplicate trigger; last loaded module wins"
                );
            }
        }
    }

    fn retire(mut plugin: LoadedPlugin) {
        let _ = plugin.call("cleanup", |p| p.cleanup());
        debug!(module_id = plugin.descriptor.id, module = %plugin.descriptor.name, "Module unloaded");
    }

    /// Replace every loaded instance with fresh ones built from `descriptors`.
    ///
    /// Disabled descriptors are skipped and a descriptor that fails to
    /// construct is left out. Returns how many modules are loaded.
    pub fn load(&mut self, descriptors: Vec<ModuleDescriptor>) -> usize {
        let fresh: Vec<LoadedPlugin> = descriptors
            .iter()
            .filter(|d| d.enabled)
            .filter_map(|d| self.construct_logged(d))
            .collect();

        let old = std::mem::replace(&mut self.loaded, fresh);
        self.rebuild_triggers();
        for plugin in old {
            Self::retire(plugin);
        }

        info!(loaded = self.loaded.len(), requested = descriptors.len(), "Modules loaded");
        self.loaded.len()
    }

    /// Reload one module from its current descriptor.
    ///
    /// `None` or a disabled descriptor unloads it. The replacement is built
    /// before the old instance is touched, so a failed construction leaves
    /// the old instance loaded.
    pub fn reload_module(&mut self, id: i64, descriptor: Option<ModuleDescriptor>) -> Result<(), PluginError> {
        let Some(descriptor) = descriptor.filter(|d| d.enabled) else {
            self.unload_module(id);
            return Ok(());
        };

        let fresh = self.construct(&descriptor)?;
        match self.loaded.iter().position(|p| p.descriptor.id == id) {
            Some(index) => {
                let old = std::mem::replace(&mut self.loaded[index], fresh);
                self.rebuild_triggers();
                Self::retire(old);
            }
            None => {
                self.loaded.push(fresh);
                self.rebuild_triggers();
            }
        }
        info!(module_id = id, module = %descriptor.name, "Module reloaded");
        Ok(())
    }

    /// Returns whether the module was loaded.
    pub fn unload_module(&mut self, id: i64) -> bool {
        let Some(index) = self.loaded.iter().position(|p| p.descriptor.id == id) else {
            return false;
        };
        let plugin = self.loaded.remove(index);
        self.rebuild_triggers();
        Self::retire(plugin);
        true
    }

    /// Unload everything.
    pub fn clear(&mut self) {
        self.triggers.clear();
        for plugin in std::mem::take(&mut self.loaded) {
            Self::retire(plugin);
        }
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    pub fn loaded_ids(&self) -> Vec<i64> {
        self.loaded.iter().map(|p| p.descriptor.id).collect()
    }

    /// Module answering `trigger`, if any.
    pub fn trigger_owner(&self, trigger: &str) -> Option<i64> {
        self.triggers.get(&normalize_trigger(trigger)).copied()
    }

    /// Route a command line to the module owning its trigger.
    ///
    /// Returns whether a module was found; a handler failure still counts
    /// as handled and queues [`COMMAND_FAILED_REPLY`] for the channel.
    pub fn dispatch_command(&mut self, text: &str, channel: &str, user: &str) -> bool {
        let Some((command, args)) = parse_command(text) else {
            return false;
        };
        let Some(id) = self.triggers.get(&command).copied() else {
            return false;
        };
        let Some(plugin) = self.loaded.iter_mut().find(|p| p.descriptor.id == id) else {
            return false;
        };
        debug!(module_id = id, command = %command, channel, user, "Dispatching command");
        if plugin
            .call("command", |p| p.handle_command(&command, &args, channel, user))
            .is_err()
        {
            let _ = self.outputs.send(PluginOutput {
                module_id: id,
                target: channel.to_string(),
                text: COMMAND_FAILED_REPLY.to_string(),
            });
        }
        true
    }

    /// Offer a channel message to every loaded module in load order.
    pub fn dispatch_message(&mut self, channel: &str, user: &str, text: &str) {
        for plugin in &mut self.loaded {
            let _ = plugin.call("message", |p| p.handle_message(channel, user, text));
        }
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
