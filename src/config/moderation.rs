//! Fallback moderation policy.

use serde::Deserialize;

use super::defaults::{default_caps_percentage, default_flood_threshold, default_flood_timeframe};

/// What to do in channels without a stored moderation row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnconfiguredPolicy {
    /// No checks at all.
    #[default]
    Open,
    /// Apply the default thresholds below.
    Closed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationSettings {
    #[serde(default)]
    pub unconfigured: UnconfiguredPolicy,
    #[serde(default = "default_flood_threshold")]
    pub flood_threshold: u32,
    #[serde(default = "default_flood_timeframe")]
    pub flood_timeframe_secs: u64,
    #[serde(default = "default_caps_percentage")]
    pub caps_percentage: u8,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            unconfigured: UnconfiguredPolicy::Open,
            flood_threshold: default_flood_threshold(),
            flood_timeframe_secs: default_flood_timeframe(),
            caps_percentage: default_caps_percentage(),
        }
    }
}
