//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Top-level [`Config`], loading, logging options
//! - [`irc`]: Upstream IRC connection settings
//! - [`gateway`]: Observer WebSocket gateway
//! - [`ai`]: Conversational backend settings
//! - [`storage`]: Module / moderation storage backend selection
//! - [`moderation`]: Fallback moderation policy for unconfigured channels

mod ai;
pub mod defaults;
mod gateway;
mod irc;
mod moderation;
mod storage;
mod types;
pub mod validation;

pub use ai::{AiConfig, AiProvider};
pub use gateway::GatewayConfig;
pub use irc::IrcConfig;
pub use moderation::{ModerationSettings, UnconfiguredPolicy};
pub use storage::{StorageBackend, StorageConfig};
pub use types::{Config, ConfigError, LogConfig, LogFormat};
