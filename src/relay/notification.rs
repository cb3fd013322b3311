//! Frames sent to observers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::history::HistoryEntry;
use crate::state::RosterEntry;

/// Relay to observer frame, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Status {
        connected: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        server: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        nick: Option<String>,
    },
    ChannelList {
        channels: Vec<String>,
    },
    /// Sent only to the observer that joined.
    JoinedChannel {
        channel: String,
    },
    Roster {
        channel: String,
        users: Vec<RosterEntry>,
    },
    Message {
        channel: String,
        sender: String,
        text: String,
        timestamp: DateTime<Utc>,
    },
    History {
        channel: String,
        messages: Vec<HistoryEntry>,
    },
    Topic {
        channel: String,
        text: String,
    },
    System {
        channel: String,
        text: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl Notification {
    pub fn disconnected() -> Self {
        Self::Status {
            connected: false,
            server: None,
            port: None,
            nick: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The room a notification is scoped to; `None` for global frames.
    pub fn room(&self) -> Option<&str> {
        match self {
            Self::Roster { channel, .. }
            | Self::Message { channel, .. }
            | Self::History { channel, .. }
            | Self::Topic { channel, .. }
            | Self::System { channel, .. }
            | Self::JoinedChannel { channel } => Some(channel),
            Self::Status { .. } | Self::ChannelList { .. } | Self::Error { .. } => None,
        }
    }
}
