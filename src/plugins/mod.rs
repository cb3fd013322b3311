//! Command and message handlers.
//!
//! Handlers are compiled in and selected by the `kind` of a stored
//! [`ModuleDescriptor`](crate::storage::ModuleDescriptor). Each loaded
//! instance gets one capability, a [`PluginSender`], and never touches
//! session state directly.

pub mod builtin;
mod catalog;
mod registry;
mod traits;

pub use catalog::{Constructor, PluginCatalog};
pub use registry::{COMMAND_FAILED_REPLY, COMMAND_PREFIXES, PluginRegistry, normalize_trigger, parse_command};
pub use traits::{Plugin, PluginOutput, PluginSender};
