//! Session state: channel rosters and topics for the single upstream session.
//!
//! `SessionState` is owned by the session actor and mutated only through
//! [`SessionState::apply`]. Applying an event never fails; it returns what
//! changed (for the relay), commands to issue (for the adapter) and which
//! members left (for the moderation windows).

mod ban;
mod channel;

pub use ban::ban_matches;
pub use channel::{Channel, Member, MemberModes, RosterEntry, split_names_entry};

use crate::event::{InboundEvent, OutboundCommand};
use relay_proto::{irc_eq, irc_to_lower, is_channel_name, parse_mode_changes};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Observable outcome of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    ChannelAdded { channel: String },
    ChannelRemoved { channel: String },
    RosterChanged { channel: String },
    TopicChanged { channel: String, topic: String },
    /// Human-readable line for a channel's observers.
    System { channel: String, text: String },
    OwnNickChanged { old: String, new: String },
}

/// A member that is no longer in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub channel: String,
    pub nick: String,
}

#[derive(Debug, Default)]
pub struct Applied {
    pub changes: Vec<StateChange>,
    pub commands: Vec<OutboundCommand>,
    pub departures: Vec<Departure>,
}

impl Applied {
    fn system(&mut self, channel: &str, text: String) {
        self.changes.push(StateChange::System {
            channel: channel.to_string(),
            text,
        });
    }

    fn roster(&mut self, channel: &str) {
        self.changes.push(StateChange::RosterChanged {
            channel: channel.to_string(),
        });
    }

    /// Whether the set of channels changed.
    pub fn channel_list_changed(&self) -> bool {
        self.changes.iter().any(|c| {
            matches!(
                c,
                StateChange::ChannelAdded { .. } | StateChange::ChannelRemoved { .. }
            )
        })
    }
}

fn with_reason(base: String, reason: Option<&str>) -> String {
    match reason.filter(|r| !r.is_empty()) {
        Some(reason) => format!("{base} ({reason})"),
        None => base,
    }
}

/// Channels, rosters and topics, keyed by case-folded name.
#[derive(Debug)]
pub struct SessionState {
    nick: String,
    channels: BTreeMap<String, Channel>,
    topics: HashMap<String, String>,
}

impl SessionState {
    pub fn new(nick: &str) -> Self {
        Self {
            nick: nick.to_string(),
            channels: BTreeMap::new(),
            topics: HashMap::new(),
        }
    }

    /// Our current nick.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn is_self(&self, nick: &str) -> bool {
        irc_eq(&self.nick, nick)
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&irc_to_lower(name))
    }

    /// Display names of all channels, ordered case-insensitively.
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.values().map(|c| c.name.clone()).collect()
    }

    pub fn topic(&self, channel: &str) -> Option<&str> {
        self.topics.get(&irc_to_lower(channel)).map(String::as_str)
    }

    pub fn roster(&self, channel: &str) -> Option<Vec<RosterEntry>> {
        self.channel(channel).map(Channel::roster)
    }

    /// Forget everything; used on disconnect.
    pub fn clear(&mut self) {
        self.channels.clear();
        self.topics.clear();
    }

    /// Apply one normalized event.
    ///
    /// Events with an empty required field are logged and dropped.
    pub fn apply(&mut self, event: &InboundEvent) -> Applied {
        let mut out = Applied::default();

        if let Some(field) = event.missing_field() {
            warn!(kind = event.kind(), field, "Dropping malformed event");
            return out;
        }

        match event {
            InboundEvent::Connected { nick, .. } => {
                self.nick = nick.clone();
            }
            InboundEvent::Disconnected { .. } | InboundEvent::Message { .. } => {}
            InboundEvent::Join {
                channel,
                nick,
                hostmask,
            } => self.on_join(channel, nick, hostmask.as_deref(), &mut out),
            InboundEvent::Part {
                channel,
                nick,
                reason,
            } => {
                let text = with_reason(format!("* {nick} has left {channel}"), reason.as_deref());
                self.on_departure(channel, nick, text, &mut out);
            }
            InboundEvent::Kick {
                channel,
                nick,
                by,
                reason,
            } => {
                let by = by.as_deref().unwrap_or("the server");
                let text = with_reason(
                    format!("* {nick} was kicked from {channel} by {by}"),
                    reason.as_deref(),
                );
                self.on_departure(channel, nick, text, &mut out);
            }
            InboundEvent::Quit { nick, reason } => self.on_quit(nick, reason.as_deref(), &mut out),
            InboundEvent::NickChange { old, new } => self.on_nick(old, new, &mut out),
            InboundEvent::Topic {
                channel,
                nick,
                text,
            } => self.on_topic(channel, nick.as_deref(), text, &mut out),
            InboundEvent::Mode {
                target,
                nick,
                modes,
                args,
            } => {
                if is_channel_name(target) {
                    self.on_mode(target, nick.as_deref(), modes, args, &mut out);
                }
            }
            InboundEvent::Ban { channel, mask, .. } => self.on_ban(channel, mask, &mut out),
            InboundEvent::Names { channel, names } => self.on_names(channel, names, &mut out),
        }

        out
    }

    fn on_join(&mut self, channel: &str, nick: &str, hostmask: Option<&str>, out: &mut Applied) {
        let chan = match self.channels.entry(irc_to_lower(channel)) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                out.changes.push(StateChange::ChannelAdded {
                    channel: channel.to_string(),
                });
                out.commands.push(OutboundCommand::Names {
                    channel: channel.to_string(),
                });
                out.commands.push(OutboundCommand::Topic {
                    channel: channel.to_string(),
                    text: None,
                });
                e.insert(Channel::new(channel))
            }
        };

        chan.insert(Member {
            nick: nick.to_string(),
            modes: MemberModes::default(),
            hostmask: hostmask.map(str::to_string),
        });
        let name = chan.name.clone();
        out.roster(&name);
        out.system(&name, format!("* {nick} has joined {name}"));
    }

    /// Part or kick.
    fn on_departure(&mut self, channel: &str, nick: &str, text: String, out: &mut Applied) {
        let key = irc_to_lower(channel);
        if self.is_self(nick) {
            if let Some(name) = self.channels.get(&key).map(|c| c.name.clone()) {
                out.system(&name, text);
                self.drop_channel(&key, out);
            }
            return;
        }

        let Some(chan) = self.channels.get_mut(&key) else {
            debug!(channel, nick, "Departure from untracked channel");
            return;
        };
        if chan.remove(nick).is_none() {
            debug!(channel, nick, "Departure of unknown member");
            return;
        }
        let name = chan.name.clone();
        out.departures.push(Departure {
            channel: name.clone(),
            nick: nick.to_string(),
        });
        out.system(&name, text);
        self.after_removal(&key, out);
    }

    /// Emit a roster update, or drop the channel if nobody is left.
    fn after_removal(&mut self, key: &str, out: &mut Applied) {
        let Some(chan) = self.channels.get(key) else {
            return;
        };
        if chan.is_empty() {
            let name = chan.name.clone();
            self.channels.remove(key);
            self.topics.remove(key);
            out.changes.push(StateChange::ChannelRemoved { channel: name });
        } else {
            out.roster(&chan.name.clone());
        }
    }

    /// We left the channel; everybody in it is gone from our point of view.
    fn drop_channel(&mut self, key: &str, out: &mut Applied) {
        let Some(chan) = self.channels.remove(key) else {
            return;
        };
        self.topics.remove(key);
        out.departures.extend(chan.members().map(|m| Departure {
            channel: chan.name.clone(),
            nick: m.nick.clone(),
        }));
        out.changes.push(StateChange::ChannelRemoved { channel: chan.name });
    }

    fn on_quit(&mut self, nick: &str, reason: Option<&str>, out: &mut Applied) {
        if self.is_self(nick) {
            return;
        }
        let keys: Vec<String> = self
            .channels
            .iter()
            .filter(|(_, c)| c.member(nick).is_some())
            .map(|(k, _)| k.clone())
            .collect();

        for key in keys {
            let Some(chan) = self.channels.get_mut(&key) else {
                continue;
            };
            chan.remove(nick);
            let name = chan.name.clone();
            out.departures.push(Departure {
                channel: name.clone(),
                nick: nick.to_string(),
            });
            out.system(&name, with_reason(format!("* {nick} has quit"), reason));
            self.after_removal(&key, out);
        }
    }

    fn on_nick(&mut self, old: &str, new: &str, out: &mut Applied) {
        if self.is_self(old) {
            let previous = std::mem::replace(&mut self.nick, new.to_string());
            out.changes.push(StateChange::OwnNickChanged {
                old: previous,
                new: new.to_string(),
            });
        }

        for chan in self.channels.values_mut() {
            let Some(mut member) = chan.remove(old) else {
                continue;
            };
            member.nick = new.to_string();
            chan.insert(member);
            out.changes.push(StateChange::RosterChanged {
                channel: chan.name.clone(),
            });
            out.changes.push(StateChange::System {
                channel: chan.name.clone(),
                text: format!("* {old} is now known as {new}"),
            });
        }
    }

    fn on_topic(&mut self, channel: &str, nick: Option<&str>, text: &str, out: &mut Applied) {
        let key = irc_to_lower(channel);
        let name = self
            .channels
            .get(&key)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| channel.to_string());
        self.topics.insert(key, text.to_string());
        out.changes.push(StateChange::TopicChanged {
            channel: name.clone(),
            topic: text.to_string(),
        });
        if let Some(nick) = nick {
            out.system(&name, format!("* {nick} changed the topic to: {text}"));
        }
    }

    fn on_mode(
        &mut self,
        target: &str,
        nick: Option<&str>,
        modes: &str,
        args: &[String],
        out: &mut Applied,
    ) {
        let Some(chan) = self.channels.get_mut(&irc_to_lower(target)) else {
            return;
        };

        let mut roster_changed = false;
        for change in parse_mode_changes(modes, args) {
            if let Some(arg) = &change.arg
                && let Some(member) = chan.member_mut(arg)
                && member.modes.set(change.mode, change.adding)
            {
                roster_changed = true;
            }
        }

        let name = chan.name.clone();
        if roster_changed {
            out.roster(&name);
        }
        let setter = nick.unwrap_or("the server");
        let line = std::iter::once(modes)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        out.system(&name, format!("* {setter} sets mode {line}"));
    }

    fn on_ban(&mut self, channel: &str, mask: &str, out: &mut Applied) {
        let key = irc_to_lower(channel);
        let own = self.nick.clone();
        let Some(chan) = self.channels.get_mut(&key) else {
            debug!(channel, mask, "Ban on untracked channel");
            return;
        };

        let banned: Vec<String> = chan
            .members()
            .filter(|m| !irc_eq(&m.nick, &own))
            .filter(|m| ban_matches(mask, &m.nick, m.hostmask.as_deref()))
            .map(|m| m.nick.clone())
            .collect();
        if banned.is_empty() {
            return;
        }

        let name = chan.name.clone();
        for nick in banned {
            chan.remove(&nick);
            out.system(&name, format!("* {nick} was banned from {name} ({mask})"));
            out.departures.push(Departure {
                channel: name.clone(),
                nick,
            });
        }
        self.after_removal(&key, out);
    }

    fn on_names(&mut self, channel: &str, names: &[String], out: &mut Applied) {
        let chan = match self.channels.entry(irc_to_lower(channel)) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                out.changes.push(StateChange::ChannelAdded {
                    channel: channel.to_string(),
                });
                e.insert(Channel::new(channel))
            }
        };

        let known_hosts: HashMap<String, String> = chan
            .members()
            .filter_map(|m| m.hostmask.clone().map(|h| (irc_to_lower(&m.nick), h)))
            .collect();
        chan.clear();

        for entry in names {
            let (modes, nick) = split_names_entry(entry);
            if nick.is_empty() {
                continue;
            }
            chan.insert(Member {
                nick: nick.to_string(),
                modes,
                hostmask: known_hosts.get(&irc_to_lower(nick)).cloned(),
            });
        }
        let name = chan.name.clone();
        out.roster(&name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(channel: &str, nick: &str) -> InboundEvent {
        InboundEvent::Join {
            channel: channel.into(),
            nick: nick.into(),
            hostmask: None,
        }
    }

    fn part(channel: &str, nick: &str) -> InboundEvent {
        InboundEvent::Part {
            channel: channel.into(),
            nick: nick.into(),
            reason: None,
        }
    }

    fn names(channel: &str, list: &[&str]) -> InboundEvent {
        InboundEvent::Names {
            channel: channel.into(),
            names: list.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn systems(applied: &Applied) -> Vec<String> {
        applied
            .changes
            .iter()
            .filter_map(|c| match c {
                StateChange::System { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn nicks(state: &SessionState, channel: &str) -> Vec<String> {
        state
            .roster(channel)
            .unwrap_or_default()
            .into_iter()
            .map(|e| format!("{}{}", e.mode, e.nick))
            .collect()
    }

    // ========================================================================
    // Join / part
    // ========================================================================

    #[test]
    fn first_join_creates_channel_and_queries_it() {
        let mut state = SessionState::new("relay");
        let applied = state.apply(&join("#Rust", "relay"));

        assert!(applied.channel_list_changed());
        assert_eq!(
            applied.commands,
            vec![
                OutboundCommand::Names { channel: "#Rust".into() },
                OutboundCommand::Topic { channel: "#Rust".into(), text: None },
            ]
        );
        assert_eq!(systems(&applied), vec!["* relay has joined #Rust"]);
        assert_eq!(state.channel_names(), vec!["#Rust"]);

        // Second join into a known channel issues no queries.
        let applied = state.apply(&join("#rust", "alice"));
        assert!(applied.commands.is_empty());
        assert!(!applied.channel_list_changed());
        assert_eq!(nicks(&state, "#RUST"), vec!["alice", "relay"]);
    }

    #[test]
    fn last_member_leaving_removes_channel() {
        let mut state = SessionState::new("relay");
        state.apply(&names("#c", &["alice"]));
        let applied = state.apply(&part("#c", "alice"));

        assert_eq!(systems(&applied), vec!["* alice has left #c"]);
        assert!(applied
            .changes
            .contains(&StateChange::ChannelRemoved { channel: "#c".into() }));
        assert!(state.channel("#c").is_none());
        assert_eq!(
            applied.departures,
            vec![Departure { channel: "#c".into(), nick: "alice".into() }]
        );
    }

    #[test]
    fn self_part_drops_the_whole_channel() {
        let mut state = SessionState::new("relay");
        state.apply(&names("#c", &["relay", "@alice", "bob"]));
        state.apply(&InboundEvent::Topic {
            channel: "#c".into(),
            nick: None,
            text: "hi".into(),
        });

        let applied = state.apply(&part("#c", "Relay"));
        assert!(state.channel("#c").is_none());
        assert!(state.topic("#c").is_none());
        assert_eq!(applied.departures.len(), 3);
        assert!(applied.channel_list_changed());
    }

    #[test]
    fn part_of_unknown_member_is_ignored() {
        let mut state = SessionState::new("relay");
        state.apply(&names("#c", &["relay", "alice"]));
        let applied = state.apply(&part("#c", "ghost"));
        assert!(applied.changes.is_empty());
        let applied = state.apply(&part("#nowhere", "alice"));
        assert!(applied.changes.is_empty());
    }

    #[test]
    fn kick_reads_like_a_part() {
        let mut state = SessionState::new("relay");
        state.apply(&names("#c", &["relay", "alice"]));
        let applied = state.apply(&InboundEvent::Kick {
            channel: "#c".into(),
            nick: "alice".into(),
            by: Some("op".into()),
            reason: Some("bye".into()),
        });
        assert_eq!(systems(&applied), vec!["* alice was kicked from #c by op (bye)"]);
        assert_eq!(nicks(&state, "#c"), vec!["relay"]);
    }

    // ========================================================================
    // Quit / nick
    // ========================================================================

    #[test]
    fn quit_leaves_every_channel() {
        let mut state = SessionState::new("relay");
        state.apply(&names("#a", &["relay", "alice"]));
        state.apply(&names("#b", &["relay", "alice"]));
        state.apply(&names("#c", &["relay"]));

        let applied = state.apply(&InboundEvent::Quit {
            nick: "alice".into(),
            reason: Some("gone".into()),
        });
        assert_eq!(
            systems(&applied),
            vec!["* alice has quit (gone)", "* alice has quit (gone)"]
        );
        assert_eq!(applied.departures.len(), 2);
        assert_eq!(nicks(&state, "#a"), vec!["relay"]);
        assert_eq!(nicks(&state, "#b"), vec!["relay"]);
    }

    #[test]
    fn nick_change_keeps_privileges() {
        let mut state = SessionState::new("relay");
        state.apply(&names("#a", &["relay", "@alice"]));
        state.apply(&names("#b", &["relay", "+alice"]));

        let applied = state.apply(&InboundEvent::NickChange {
            old: "alice".into(),
            new: "alicia".into(),
        });
        assert_eq!(nicks(&state, "#a"), vec!["@alicia", "relay"]);
        assert_eq!(nicks(&state, "#b"), vec!["+alicia", "relay"]);
        assert_eq!(
            systems(&applied),
            vec!["* alice is now known as alicia", "* alice is now known as alicia"]
        );
        // Rosters from channels the nick was never in are untouched.
        assert_eq!(applied.changes.len(), 4);
    }

    #[test]
    fn own_nick_change_is_tracked() {
        let mut state = SessionState::new("relay_");
        state.apply(&names("#a", &["relay_"]));
        let applied = state.apply(&InboundEvent::NickChange {
            old: "relay_".into(),
            new: "relay".into(),
        });
        assert_eq!(state.nick(), "relay");
        assert!(applied.changes.contains(&StateChange::OwnNickChanged {
            old: "relay_".into(),
            new: "relay".into()
        }));
    }

    // ========================================================================
    // Topic / names / modes / bans
    // ========================================================================

    #[test]
    fn topic_is_stored_even_before_join() {
        let mut state = SessionState::new("relay");
        let applied = state.apply(&InboundEvent::Topic {
            channel: "#c".into(),
            nick: Some("alice".into()),
            text: "new topic".into(),
        });
        assert_eq!(state.topic("#C"), Some("new topic"));
        assert_eq!(systems(&applied), vec!["* alice changed the topic to: new topic"]);
    }

    #[test]
    fn names_reply_replaces_roster() {
        let mut state = SessionState::new("relay");
        state.apply(&names("#c", &["relay", "old"]));
        state.apply(&names("#c", &["relay", "@op", "%half", "+voice", "~owner", "&admin"]));
        assert_eq!(
            nicks(&state, "#c"),
            vec!["~owner", "&admin", "@op", "%half", "+voice", "relay"]
        );
    }

    #[test]
    fn names_keeps_known_hostmasks() {
        let mut state = SessionState::new("relay");
        state.apply(&InboundEvent::Join {
            channel: "#c".into(),
            nick: "alice".into(),
            hostmask: Some("a@host".into()),
        });
        state.apply(&names("#c", &["relay", "alice"]));
        let member = state.channel("#c").and_then(|c| c.member("alice")).cloned();
        assert_eq!(member.and_then(|m| m.hostmask).as_deref(), Some("a@host"));
    }

    #[test]
    fn op_and_voice_modes_update_members() {
        let mut state = SessionState::new("relay");
        state.apply(&names("#c", &["relay", "alice", "bob"]));
        let applied = state.apply(&InboundEvent::Mode {
            target: "#c".into(),
            nick: Some("chanserv".into()),
            modes: "+ov".into(),
            args: vec!["alice".into(), "bob".into()],
        });
        assert_eq!(nicks(&state, "#c"), vec!["@alice", "+bob", "relay"]);
        assert_eq!(systems(&applied), vec!["* chanserv sets mode +ov alice bob"]);
    }

    #[test]
    fn user_mode_on_ourselves_is_ignored() {
        let mut state = SessionState::new("relay");
        let applied = state.apply(&InboundEvent::Mode {
            target: "relay".into(),
            nick: Some("relay".into()),
            modes: "+B".into(),
            args: vec![],
        });
        assert!(applied.changes.is_empty());
    }

    #[test]
    fn ban_removes_matching_members_but_never_us() {
        let mut state = SessionState::new("relay");
        state.apply(&names("#c", &["relay", "spam1", "spam2", "alice"]));

        let applied = state.apply(&InboundEvent::Ban {
            channel: "#c".into(),
            mask: "spam*".into(),
            by: Some("op".into()),
        });
        assert_eq!(nicks(&state, "#c"), vec!["alice", "relay"]);
        assert_eq!(applied.departures.len(), 2);

        let applied = state.apply(&InboundEvent::Ban {
            channel: "#c".into(),
            mask: "*!*@*".into(),
            by: None,
        });
        assert_eq!(nicks(&state, "#c"), vec!["relay"]);
        assert_eq!(applied.departures.len(), 1);
    }

    #[test]
    fn ban_prefix_mask_spares_non_matching_nicks() {
        let mut state = SessionState::new("relay");
        state.apply(&names("#c", &["relay", "baduser", "gooduser"]));

        let applied = state.apply(&InboundEvent::Ban {
            channel: "#c".into(),
            mask: "bad*".into(),
            by: Some("op".into()),
        });
        assert_eq!(nicks(&state, "#c"), vec!["gooduser", "relay"]);
        assert_eq!(applied.departures.len(), 1);
    }

    // ========================================================================
    // Malformed input
    // ========================================================================

    #[test]
    fn malformed_events_are_dropped() {
        let mut state = SessionState::new("relay");
        let applied = state.apply(&join("", "alice"));
        assert!(applied.changes.is_empty());
        assert!(state.channel_names().is_empty());
    }
}
