//! Normalized events flowing into the session and commands flowing out.
//!
//! The protocol adapter is the only place that knows about raw IRC lines;
//! everything downstream speaks these two enums.

use relay_proto::Message;

/// A protocol occurrence after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Registration finished; `nick` is the nick the server accepted.
    Connected {
        server: String,
        port: u16,
        nick: String,
    },
    /// The upstream connection ended.
    Disconnected { reason: String },
    Join {
        channel: String,
        nick: String,
        /// `user@host` when the server sent a full source.
        hostmask: Option<String>,
    },
    Part {
        channel: String,
        nick: String,
        reason: Option<String>,
    },
    Quit {
        nick: String,
        reason: Option<String>,
    },
    NickChange { old: String, new: String },
    /// PRIVMSG to a channel or to us.
    Message {
        target: String,
        nick: String,
        text: String,
    },
    /// Topic change or topic reply. `nick` is absent for numeric replies.
    Topic {
        channel: String,
        nick: Option<String>,
        text: String,
    },
    Mode {
        target: String,
        nick: Option<String>,
        modes: String,
        args: Vec<String>,
    },
    Kick {
        channel: String,
        nick: String,
        by: Option<String>,
        reason: Option<String>,
    },
    /// One `+b` entry extracted from a MODE line.
    Ban {
        channel: String,
        mask: String,
        by: Option<String>,
    },
    /// Complete names listing for a channel (all 353 lines up to 366).
    Names { channel: String, names: Vec<String> },
}

impl InboundEvent {
    /// Short label for spans and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Join { .. } => "join",
            Self::Part { .. } => "part",
            Self::Quit { .. } => "quit",
            Self::NickChange { .. } => "nick",
            Self::Message { .. } => "message",
            Self::Topic { .. } => "topic",
            Self::Mode { .. } => "mode",
            Self::Kick { .. } => "kick",
            Self::Ban { .. } => "ban",
            Self::Names { .. } => "names",
        }
    }

    /// Name of the first required field that is empty, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        let check = |value: &str, name: &'static str| value.trim().is_empty().then_some(name);
        match self {
            Self::Connected { nick, .. } => check(nick, "nick"),
            Self::Disconnected { .. } => None,
            Self::Join { channel, nick, .. } | Self::Part { channel, nick, .. } => {
                check(channel, "channel").or_else(|| check(nick, "nick"))
            }
            Self::Kick { channel, nick, .. } => {
                check(channel, "channel").or_else(|| check(nick, "nick"))
            }
            Self::Quit { nick, .. } => check(nick, "nick"),
            Self::NickChange { old, new } => check(old, "old").or_else(|| check(new, "new")),
            Self::Message { target, nick, .. } => {
                check(target, "target").or_else(|| check(nick, "nick"))
            }
            Self::Topic { channel, .. } | Self::Names { channel, .. } => check(channel, "channel"),
            Self::Mode { target, modes, .. } => {
                check(target, "target").or_else(|| check(modes, "modes"))
            }
            Self::Ban { channel, mask, .. } => {
                check(channel, "channel").or_else(|| check(mask, "mask"))
            }
        }
    }
}

/// A request to the protocol adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    Join { channel: String },
    Part { channel: String },
    Privmsg { target: String, text: String },
    /// Query (`None`) or set the topic.
    Topic { channel: String, text: Option<String> },
    Kick {
        channel: String,
        nick: String,
        reason: String,
    },
    Mode { target: String, modes: String },
    Names { channel: String },
    Nick { nick: String },
    Quit { reason: String },
}

impl OutboundCommand {
    pub fn to_message(&self) -> Message {
        match self {
            Self::Join { channel } => Message::join(channel),
            Self::Part { channel } => Message::part(channel, None),
            Self::Privmsg { target, text } => Message::privmsg(target, text),
            Self::Topic { channel, text } => Message::topic(channel, text.as_deref()),
            Self::Kick {
                channel,
                nick,
                reason,
            } => Message::kick(channel, nick, reason),
            Self::Mode { target, modes } => Message::mode(target, modes),
            Self::Names { channel } => Message::names(channel),
            Self::Nick { nick } => Message::nick(nick),
            Self::Quit { reason } => Message::quit(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_reported() {
        let ev = InboundEvent::Join {
            channel: "".into(),
            nick: "alice".into(),
            hostmask: None,
        };
        assert_eq!(ev.missing_field(), Some("channel"));

        let ev = InboundEvent::Message {
            target: "#c".into(),
            nick: " ".into(),
            text: "hi".into(),
        };
        assert_eq!(ev.missing_field(), Some("nick"));

        let ev = InboundEvent::Quit {
            nick: "bob".into(),
            reason: None,
        };
        assert_eq!(ev.missing_field(), None);
    }

    #[test]
    fn commands_render_as_irc_lines() {
        let kick = OutboundCommand::Kick {
            channel: "#c".into(),
            nick: "spam".into(),
            reason: "Flooding is not allowed".into(),
        };
        assert_eq!(kick.to_message().to_string(), "KICK #c spam :Flooding is not allowed");

        let query = OutboundCommand::Topic {
            channel: "#c".into(),
            text: None,
        };
        assert_eq!(query.to_message().to_string(), "TOPIC #c");
    }
}
