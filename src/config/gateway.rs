//! Observer gateway settings.

use serde::Deserialize;
use std::net::SocketAddr;

use super::defaults::{default_gateway_address, default_true};

/// WebSocket endpoint for web observers.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_gateway_address")]
    pub address: SocketAddr,
    /// Shared secret observers present in their `init` frame. No token
    /// means every local observer is trusted.
    #[serde(default)]
    pub token: Option<String>,
    /// Allowed `Origin` values. Empty allows any origin.
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_gateway_address(),
            token: None,
            allow_origins: Vec::new(),
        }
    }
}
