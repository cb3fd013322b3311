//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use std::net::SocketAddr;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// IRC Defaults
// =============================================================================

pub fn default_irc_port() -> u16 {
    6667
}

pub fn default_user_modes() -> String {
    "+B".to_string()
}

pub fn default_reclaim_delay() -> u64 {
    2
}

pub fn default_connect_timeout() -> u64 {
    30
}

pub fn default_connect_attempts() -> u32 {
    3
}

pub fn default_retry_delay() -> u64 {
    5
}

// =============================================================================
// Gateway Defaults
// =============================================================================

pub fn default_gateway_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

// =============================================================================
// AI Defaults
// =============================================================================

pub fn default_system_prompt() -> String {
    "You are a helpful IRC bot. Keep answers short and plain-text.".to_string()
}

pub fn default_max_tokens() -> u32 {
    150
}

pub fn default_ai_timeout() -> u64 {
    30
}

// =============================================================================
// Moderation Defaults
// =============================================================================

pub fn default_flood_threshold() -> u32 {
    8
}

pub fn default_flood_timeframe() -> u64 {
    60
}

pub fn default_caps_percentage() -> u8 {
    70
}
