//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::ai::AiConfig;
use super::gateway::GatewayConfig;
use super::irc::IrcConfig;
use super::moderation::ModerationSettings;
use super::storage::StorageConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "config_io",
            Self::Parse(_) => "config_parse",
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Upstream connection.
    pub irc: IrcConfig,
    /// Observer WebSocket gateway.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Where modules and moderation rows come from.
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ai: AiConfig,
    /// Policy for channels without a moderation row.
    #[serde(default)]
    pub moderation: ModerationSettings,
    #[serde(default)]
    pub log: LogConfig,
    /// Prometheus metrics HTTP port (default: 9090, 0 disables).
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    #[serde(alias = "text")]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}
