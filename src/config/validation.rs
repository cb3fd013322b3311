//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::{AiProvider, Config, StorageBackend};
use relay_proto::is_channel_name;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("irc.server is required")]
    MissingServer,
    #[error("irc.port must be non-zero")]
    InvalidPort,
    #[error("irc.nick is not a valid nickname: '{0}'")]
    InvalidNick(String),
    #[error("irc.channels entry is not a channel name: '{0}'")]
    InvalidChannel(String),
    #[error("irc.ca_file does not exist: {0}")]
    CaFileNotFound(String),
    #[error("irc.connect_attempts must be at least 1")]
    NoConnectAttempts,
    #[error("ai.endpoint is required for the custom provider")]
    MissingAiEndpoint,
    #[error("storage.path is required for the sqlite backend")]
    MissingDatabasePath,
    #[error("storage.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
    #[error("duplicate module id {0}")]
    DuplicateModuleId(i64),
    #[error("moderation caps_percentage must be within 0..=100, got {0}")]
    InvalidCapsPercentage(u8),
    #[error("moderation flood_threshold must be at least 1")]
    InvalidFloodThreshold,
}

/// Nicknames: a letter or special first, then letters, digits, specials or `-`.
pub fn is_valid_nick(nick: &str) -> bool {
    let special = |c: char| "[]\\`_^{|}".contains(c);
    let mut chars = nick.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || special(c) => {}
        _ => return false,
    }
    nick.len() <= 30 && chars.all(|c| c.is_ascii_alphanumeric() || special(c) || c == '-')
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let irc = &config.irc;

    if irc.server.trim().is_empty() {
        errors.push(ValidationError::MissingServer);
    }
    if irc.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }
    if !is_valid_nick(&irc.nick) {
        errors.push(ValidationError::InvalidNick(irc.nick.clone()));
    }
    for channel in &irc.channels {
        if !is_channel_name(channel) || channel.contains([' ', ',']) {
            errors.push(ValidationError::InvalidChannel(channel.clone()));
        }
    }
    if let Some(ca) = &irc.ca_file
        && !ca.exists()
    {
        errors.push(ValidationError::CaFileNotFound(ca.display().to_string()));
    }
    if irc.connect_attempts == 0 {
        errors.push(ValidationError::NoConnectAttempts);
    }

    if config.ai.enabled && config.ai.provider == AiProvider::Custom && config.ai.endpoint.is_none()
    {
        errors.push(ValidationError::MissingAiEndpoint);
    }

    if config.storage.backend == StorageBackend::Sqlite {
        match &config.storage.path {
            None => errors.push(ValidationError::MissingDatabasePath),
            Some(path) => {
                if let Some(parent) = Path::new(path).parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    errors.push(ValidationError::DatabasePathInvalid(
                        path.display().to_string(),
                    ));
                }
            }
        }
    }

    let mut seen = HashSet::new();
    for module in &config.storage.modules {
        if !seen.insert(module.id) {
            errors.push(ValidationError::DuplicateModuleId(module.id));
        }
    }

    let caps = std::iter::once(config.moderation.caps_percentage)
        .chain(config.storage.moderation.iter().map(|m| m.caps_percentage));
    for pct in caps {
        if pct > 100 {
            errors.push(ValidationError::InvalidCapsPercentage(pct));
        }
    }
    let mut floods = std::iter::once(config.moderation.flood_threshold)
        .chain(config.storage.moderation.iter().map(|m| m.flood_threshold));
    if floods.any(|t| t == 0) {
        errors.push(ValidationError::InvalidFloodThreshold);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Config {
        Config::parse(text).unwrap()
    }

    #[test]
    fn valid_minimal_config() {
        let config = parse(
            r##"
            [irc]
            server = "irc.example.net"
            nick = "relay"
            channels = ["#ok", "&local"]
            "##,
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let config = parse(
            r##"
            [irc]
            server = ""
            port = 0
            nick = "9lives"
            channels = ["nohash"]

            [ai]
            enabled = true
            provider = "custom"

            [storage]
            backend = "sqlite"

            [[storage.modules]]
            id = 4
            name = "a"
            trigger = "a"
            kind = "echo"

            [[storage.modules]]
            id = 4
            name = "b"
            trigger = "b"
            kind = "echo"

            [moderation]
            caps_percentage = 140
            "##,
        );
        let errors = validate(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingServer));
        assert!(errors.contains(&ValidationError::InvalidPort));
        assert!(errors.contains(&ValidationError::InvalidNick("9lives".into())));
        assert!(errors.contains(&ValidationError::InvalidChannel("nohash".into())));
        assert!(errors.contains(&ValidationError::MissingAiEndpoint));
        assert!(errors.contains(&ValidationError::MissingDatabasePath));
        assert!(errors.contains(&ValidationError::DuplicateModuleId(4)));
        assert!(errors.contains(&ValidationError::InvalidCapsPercentage(140)));
    }

    #[test]
    fn nick_rules() {
        assert!(is_valid_nick("relay"));
        assert!(is_valid_nick("[bot]-2"));
        assert!(!is_valid_nick(""));
        assert!(!is_valid_nick("-dash"));
        assert!(!is_valid_nick("has space"));
    }
}
