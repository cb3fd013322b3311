//! Upstream IRC connection settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::{
    default_connect_attempts, default_connect_timeout, default_irc_port, default_reclaim_delay,
    default_retry_delay, default_true, default_user_modes,
};

/// Connection settings for the single upstream session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IrcConfig {
    /// Server hostname.
    pub server: String,
    #[serde(default = "default_irc_port")]
    pub port: u16,
    /// Wrap the connection in TLS.
    #[serde(default)]
    pub tls: bool,
    /// Skip certificate verification (self-signed test networks only).
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Extra PEM bundle trusted in addition to the platform roots.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    /// Desired nickname. If taken at registration, `_` is appended.
    pub nick: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub realname: Option<String>,
    /// Sent to NickServ as `IDENTIFY` once registered.
    #[serde(default)]
    pub nickserv_password: Option<String>,
    /// Channels joined after registration.
    #[serde(default)]
    pub channels: Vec<String>,
    /// User modes applied to ourselves after registration.
    #[serde(default = "default_user_modes")]
    pub user_modes: String,
    /// Wait before trying to reclaim the desired nick.
    #[serde(default = "default_reclaim_delay")]
    pub reclaim_delay_secs: u64,
    /// Connect at startup without waiting for an operator request.
    #[serde(default = "default_true")]
    pub autoconnect: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Consecutive connect attempts before giving up and raising an alert.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl IrcConfig {
    /// Minimal settings; everything else at its default.
    pub fn new(server: impl Into<String>, port: u16, nick: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port,
            tls: false,
            accept_invalid_certs: false,
            ca_file: None,
            nick: nick.into(),
            username: None,
            realname: None,
            nickserv_password: None,
            channels: Vec::new(),
            user_modes: default_user_modes(),
            reclaim_delay_secs: default_reclaim_delay(),
            autoconnect: default_true(),
            connect_timeout_secs: default_connect_timeout(),
            connect_attempts: default_connect_attempts(),
            retry_delay_secs: default_retry_delay(),
        }
    }

    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nick)
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nick)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reclaim_delay(&self) -> Duration {
        Duration::from_secs(self.reclaim_delay_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
