//! Wire messages to [`InboundEvent`]s.

use relay_proto::response::{RPL_ENDOFNAMES, RPL_NAMREPLY, RPL_NOTOPIC, RPL_TOPIC};
use relay_proto::{Message, irc_to_lower, is_channel_name, parse_mode_changes};
use std::collections::HashMap;
use tracing::trace;

use crate::event::InboundEvent;

/// Stateful normalizer for one connection.
///
/// Names replies span several 353 lines; they are collected until the 366
/// that closes them and emitted as one [`InboundEvent::Names`].
#[derive(Debug, Default)]
pub struct Normalizer {
    pending_names: HashMap<String, (String, Vec<String>)>,
}

fn param(msg: &Message, idx: usize) -> String {
    msg.param(idx).unwrap_or_default().to_string()
}

fn optional(msg: &Message, idx: usize) -> Option<String> {
    msg.param(idx).filter(|s| !s.is_empty()).map(str::to_string)
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events carried by one message; empty for anything the session
    /// does not track. Missing parameters are passed through as empty
    /// fields for the state manager to reject.
    pub fn normalize(&mut self, msg: &Message) -> Vec<InboundEvent> {
        let nick = msg.source_nick().unwrap_or_default().to_string();

        let event = match msg.command.as_str() {
            "JOIN" => InboundEvent::Join {
                channel: param(msg, 0),
                nick,
                hostmask: msg.prefix.as_ref().and_then(|p| p.user_host()),
            },
            "PART" => InboundEvent::Part {
                channel: param(msg, 0),
                nick,
                reason: optional(msg, 1),
            },
            "QUIT" => InboundEvent::Quit {
                nick,
                reason: optional(msg, 0),
            },
            "NICK" => InboundEvent::NickChange {
                old: nick,
                new: param(msg, 0),
            },
            "PRIVMSG" => {
                let text = param(msg, 1);
                if text.starts_with('\u{1}') && !text.starts_with("\u{1}ACTION ") {
                    trace!(from = %nick, "Ignoring CTCP request");
                    return Vec::new();
                }
                InboundEvent::Message {
                    target: param(msg, 0),
                    nick,
                    text,
                }
            }
            "TOPIC" => InboundEvent::Topic {
                channel: param(msg, 0),
                nick: Some(nick),
                text: param(msg, 1),
            },
            RPL_TOPIC => InboundEvent::Topic {
                channel: param(msg, 1),
                nick: None,
                text: param(msg, 2),
            },
            RPL_NOTOPIC => InboundEvent::Topic {
                channel: param(msg, 1),
                nick: None,
                text: String::new(),
            },
            "KICK" => InboundEvent::Kick {
                channel: param(msg, 0),
                nick: param(msg, 1),
                by: Some(nick).filter(|n| !n.is_empty()),
                reason: optional(msg, 2),
            },
            "MODE" => return self.mode(msg, nick),
            RPL_NAMREPLY => {
                // <me> <type> <channel> :<names>
                let channel = param(msg, 2);
                let (_, names) = self
                    .pending_names
                    .entry(irc_to_lower(&channel))
                    .or_insert_with(|| (channel.clone(), Vec::new()));
                names.extend(msg.trailing().unwrap_or_default().split_whitespace().map(str::to_string));
                return Vec::new();
            }
            RPL_ENDOFNAMES => {
                let channel = param(msg, 1);
                let (channel, names) = self
                    .pending_names
                    .remove(&irc_to_lower(&channel))
                    .unwrap_or((channel, Vec::new()));
                InboundEvent::Names { channel, names }
            }
            _ => return Vec::new(),
        };
        vec![event]
    }

    fn mode(&mut self, msg: &Message, nick: String) -> Vec<InboundEvent> {
        let target = param(msg, 0);
        let modes = param(msg, 1);
        let args: Vec<String> = msg.params.iter().skip(2).cloned().collect();
        let by = Some(nick).filter(|n| !n.is_empty());

        let mut events = Vec::new();
        if is_channel_name(&target) {
            events.extend(
                parse_mode_changes(&modes, &args)
                    .into_iter()
                    .filter(|c| c.adding && c.mode == 'b')
                    .filter_map(|c| c.arg)
                    .map(|mask| InboundEvent::Ban {
                        channel: target.clone(),
                        mask,
                        by: by.clone(),
                    }),
            );
        }
        events.insert(
            0,
            InboundEvent::Mode {
                target,
                nick: by,
                modes,
                args,
            },
        );
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(lines: &[&str]) -> Vec<InboundEvent> {
        let mut normalizer = Normalizer::new();
        lines
            .iter()
            .flat_map(|line| normalizer.normalize(&line.parse::<Message>().unwrap()))
            .collect()
    }

    #[test]
    fn join_carries_hostmask() {
        assert_eq!(
            events(&[":alice!al@host.example JOIN #rust"]),
            vec![InboundEvent::Join {
                channel: "#rust".into(),
                nick: "alice".into(),
                hostmask: Some("al@host.example".into()),
            }]
        );
    }

    #[test]
    fn names_are_collected_until_end() {
        let got = events(&[
            ":irc.test 353 relay = #rust :@alice +bob",
            ":irc.test 353 relay = #rust :carol",
            ":irc.test 366 relay #rust :End of /NAMES list.",
        ]);
        assert_eq!(
            got,
            vec![InboundEvent::Names {
                channel: "#rust".into(),
                names: vec!["@alice".into(), "+bob".into(), "carol".into()],
            }]
        );
    }

    #[test]
    fn ban_mode_yields_ban_events() {
        let got = events(&[":op!o@h MODE #c +bo *!*@bad.host alice"]);
        assert_eq!(got.len(), 2);
        assert!(matches!(&got[0], InboundEvent::Mode { modes, .. } if modes == "+bo"));
        assert_eq!(
            got[1],
            InboundEvent::Ban {
                channel: "#c".into(),
                mask: "*!*@bad.host".into(),
                by: Some("op".into()),
            }
        );

        // Removing a ban or a user mode yields only the mode event.
        assert_eq!(events(&[":op!o@h MODE #c -b *!*@x"]).len(), 1);
        assert_eq!(events(&[":relay MODE relay +B"]).len(), 1);
    }

    #[test]
    fn topic_replies() {
        assert_eq!(
            events(&[":irc.test 332 relay #c :hello world"]),
            vec![InboundEvent::Topic {
                channel: "#c".into(),
                nick: None,
                text: "hello world".into(),
            }]
        );
        assert_eq!(
            events(&[":irc.test 331 relay #c :No topic is set"]),
            vec![InboundEvent::Topic {
                channel: "#c".into(),
                nick: None,
                text: String::new(),
            }]
        );
    }

    #[test]
    fn kick_and_quit() {
        assert_eq!(
            events(&[":op!o@h KICK #c bob :bye"]),
            vec![InboundEvent::Kick {
                channel: "#c".into(),
                nick: "bob".into(),
                by: Some("op".into()),
                reason: Some("bye".into()),
            }]
        );
        assert_eq!(
            events(&[":bob!b@h QUIT"]),
            vec![InboundEvent::Quit {
                nick: "bob".into(),
                reason: None,
            }]
        );
    }

    #[test]
    fn ctcp_and_notices_are_ignored() {
        assert!(events(&[":bob!b@h PRIVMSG relay :\u{1}VERSION\u{1}"]).is_empty());
        assert!(events(&[":irc.test NOTICE * :*** Looking up your hostname"]).is_empty());
        assert_eq!(events(&[":bob!b@h PRIVMSG #c :\u{1}ACTION waves\u{1}"]).len(), 1);
    }

    #[test]
    fn missing_params_become_empty_fields() {
        let got = events(&[":alice!a@h JOIN"]);
        assert_eq!(got[0].missing_field(), Some("channel"));
    }
}
