//! Per-channel moderation: flood and excessive-caps detection.
//!
//! The engine is owned by the session actor. Channel configs are replaced
//! wholesale on reload, so a check always sees either the old table or the
//! new one. Flood windows are keyed by `(channel, nick)` after case folding.

mod window;

pub use window::FloodWindow;

use relay_proto::irc_to_lower;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::defaults::{
    default_caps_percentage, default_flood_threshold, default_flood_timeframe, default_true,
};
use crate::config::{ModerationSettings, UnconfiguredPolicy};

/// Kick reason for flooding.
pub const FLOOD_KICK_REASON: &str = "Flooding is not allowed";
/// Kick reason for shouting.
pub const CAPS_KICK_REASON: &str = "Excessive use of capital letters";
/// Messages with fewer letters than this are never caps-checked.
pub const MIN_CAPS_LETTERS: usize = 5;

/// Moderation settings for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModerationConfig {
    pub channel: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Messages tolerated inside the window before a kick.
    #[serde(default = "default_flood_threshold")]
    pub flood_threshold: u32,
    #[serde(default = "default_flood_timeframe")]
    pub flood_timeframe_secs: u64,
    /// Upper-case share of letters (0-100) above which a message is shouting.
    #[serde(default = "default_caps_percentage")]
    pub caps_percentage: u8,
}

impl ModerationConfig {
    pub fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            enabled: true,
            flood_threshold: default_flood_threshold(),
            flood_timeframe_secs: default_flood_timeframe(),
            caps_percentage: default_caps_percentage(),
        }
    }

    pub fn flood_timeframe(&self) -> Duration {
        Duration::from_secs(self.flood_timeframe_secs)
    }
}

/// Outcome of inspecting one channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    Flood,
    Caps,
}

impl Verdict {
    /// Kick reason, if the message must be punished.
    pub fn kick_reason(&self) -> Option<&'static str> {
        match self {
            Self::Clean => None,
            Self::Flood => Some(FLOOD_KICK_REASON),
            Self::Caps => Some(CAPS_KICK_REASON),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Flood => "flood",
            Self::Caps => "caps",
        }
    }
}

/// Whether `text` is shouting at `percentage` (0-100).
///
/// Fewer than [`MIN_CAPS_LETTERS`] letters never counts.
pub fn is_excessive_caps(text: &str, percentage: u8) -> bool {
    let (letters, upper) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(l, u), c| (l + 1, u + usize::from(c.is_uppercase())));
    if letters < MIN_CAPS_LETTERS {
        return false;
    }
    upper * 100 > usize::from(percentage) * letters
}

#[derive(Debug)]
pub struct ModerationEngine {
    configs: HashMap<String, ModerationConfig>,
    /// Applied to channels without a row when the policy is closed.
    fallback: Option<ModerationConfig>,
    windows: HashMap<(String, String), FloodWindow>,
}

impl ModerationEngine {
    pub fn new(settings: &ModerationSettings) -> Self {
        let fallback = match settings.unconfigured {
            UnconfiguredPolicy::Open => None,
            UnconfiguredPolicy::Closed => Some(ModerationConfig {
                channel: "*".to_string(),
                enabled: true,
                flood_threshold: settings.flood_threshold,
                flood_timeframe_secs: settings.flood_timeframe_secs,
                caps_percentage: settings.caps_percentage,
            }),
        };
        Self {
            configs: HashMap::new(),
            fallback,
            windows: HashMap::new(),
        }
    }

    /// Swap in a freshly loaded config table.
    pub fn replace_configs(&mut self, configs: Vec<ModerationConfig>) {
        let table: HashMap<String, ModerationConfig> = configs
            .into_iter()
            .map(|c| (irc_to_lower(&c.channel), c))
            .collect();
        debug!(channels = table.len(), "Moderation configs replaced");
        self.configs = table;
    }

    /// Effective config for a channel. `None` means moderation is off there.
    pub fn config_for(&self, channel: &str) -> Option<&ModerationConfig> {
        match self.configs.get(&irc_to_lower(channel)) {
            Some(config) => config.enabled.then_some(config),
            None => self.fallback.as_ref(),
        }
    }

    /// Record a message from `user` and report whether they are flooding.
    pub fn check_flood(&mut self, channel: &str, user: &str) -> bool {
        self.check_flood_at(channel, user, Instant::now())
    }

    pub fn check_flood_at(&mut self, channel: &str, user: &str, now: Instant) -> bool {
        let Some(config) = self.config_for(channel) else {
            return false;
        };
        let (threshold, timeframe) = (config.flood_threshold, config.flood_timeframe());
        let window = self
            .windows
            .entry((irc_to_lower(channel), irc_to_lower(user)))
            .or_default();
        window.record(now, timeframe) > threshold as usize
    }

    /// Whether `text` exceeds the channel's caps percentage.
    pub fn check_caps(&self, channel: &str, text: &str) -> bool {
        self.config_for(channel)
            .is_some_and(|config| is_excessive_caps(text, config.caps_percentage))
    }

    /// Flood first, then caps.
    pub fn inspect(&mut self, channel: &str, user: &str, text: &str) -> Verdict {
        self.inspect_at(channel, user, text, Instant::now())
    }

    pub fn inspect_at(&mut self, channel: &str, user: &str, text: &str, now: Instant) -> Verdict {
        if self.check_flood_at(channel, user, now) {
            Verdict::Flood
        } else if self.check_caps(channel, text) {
            Verdict::Caps
        } else {
            Verdict::Clean
        }
    }

    /// A member left a channel; their window there is meaningless now.
    pub fn forget(&mut self, channel: &str, user: &str) {
        self.windows.remove(&(irc_to_lower(channel), irc_to_lower(user)));
    }

    /// Drop windows that have gone quiet. Keeps the map from growing with
    /// every nick that ever spoke.
    pub fn prune(&mut self, now: Instant) {
        let configs = &self.configs;
        let fallback = self.fallback.as_ref();
        self.windows.retain(|(channel, _), window| {
            let timeframe = configs
                .get(channel)
                .or(fallback)
                .map(ModerationConfig::flood_timeframe)
                .unwrap_or_default();
            window.prune(now, timeframe);
            !window.is_empty()
        });
    }

    pub fn clear_windows(&mut self) {
        self.windows.clear();
    }

    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }
}
