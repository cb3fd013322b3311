//! Relay broadcaster: turns session changes into observer notifications.
//!
//! The broadcaster is owned by the session actor and is the only writer of
//! the [`Hub`] snapshot cache. Observer intents never touch state here;
//! they become outbound commands and come back as inbound events.

mod history;
mod hub;
mod notification;

pub use history::{HISTORY_CAPACITY, HistoryBuffer, HistoryEntry};
pub use hub::{Envelope, HUB_CAPACITY, Hub, MAX_QUERY_ROOMS, Status};
pub use notification::Notification;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::event::OutboundCommand;
use crate::metrics;
use crate::state::{Applied, SessionState, StateChange};

/// Observer-originated request that needs the upstream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    JoinChannel { channel: String },
    PartChannel { channel: String },
    /// Channel or nick.
    SendMessage { target: String, text: String },
    GetTopic { channel: String },
    SetTopic { channel: String, text: String },
    ListRoster { channel: String },
}

impl Intent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinChannel { .. } => "join_channel",
            Self::PartChannel { .. } => "part_channel",
            Self::SendMessage { .. } => "send_message",
            Self::GetTopic { .. } => "get_topic",
            Self::SetTopic { .. } => "set_topic",
            Self::ListRoster { .. } => "list_roster",
        }
    }

    /// The upstream command carrying this intent.
    pub fn to_command(&self) -> OutboundCommand {
        match self {
            Self::JoinChannel { channel } => OutboundCommand::Join {
                channel: channel.clone(),
            },
            Self::PartChannel { channel } => OutboundCommand::Part {
                channel: channel.clone(),
            },
            Self::SendMessage { target, text } => OutboundCommand::Privmsg {
                target: target.clone(),
                text: text.clone(),
            },
            Self::GetTopic { channel } => OutboundCommand::Topic {
                channel: channel.clone(),
                text: None,
            },
            Self::SetTopic { channel, text } => OutboundCommand::Topic {
                channel: channel.clone(),
                text: Some(text.clone()),
            },
            Self::ListRoster { channel } => OutboundCommand::Names {
                channel: channel.clone(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayBroadcaster {
    hub: Hub,
    status: Status,
}

impl RelayBroadcaster {
    pub fn new(hub: Hub) -> Self {
        let status = hub.status();
        Self { hub, status }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    fn publish_status(&mut self) {
        self.hub.set_status(self.status.clone());
        self.hub.publish(self.status.to_notification());
    }

    pub fn connected(&mut self, server: &str, port: u16, nick: &str) {
        self.status = Status {
            connected: true,
            server: Some(server.to_string()),
            port: Some(port),
            nick: Some(nick.to_string()),
        };
        self.publish_status();
    }

    /// Status goes to disconnected and every channel disappears.
    pub fn disconnected(&mut self) {
        self.status = Status::default();
        self.hub.reset_session();
        metrics::set_channels(0);
        self.publish_status();
        self.hub.publish(Notification::ChannelList { channels: Vec::new() });
    }

    /// Publish everything one applied event changed.
    pub fn publish_changes(&mut self, state: &SessionState, applied: &Applied) {
        for change in &applied.changes {
            match change {
                StateChange::ChannelAdded { channel } => {
                    self.hub
                        .set_roster(channel, state.roster(channel).unwrap_or_default());
                }
                StateChange::ChannelRemoved { channel } => {
                    debug!(channel = %channel, "Dropping relay caches for channel");
                    self.hub.drop_channel(channel);
                }
                StateChange::RosterChanged { channel } => {
                    if let Some(users) = state.roster(channel) {
                        self.hub.set_roster(channel, users.clone());
                        self.hub.publish(Notification::Roster {
                            channel: channel.clone(),
                            users,
                        });
                    }
                }
                StateChange::TopicChanged { channel, topic } => {
                    self.hub.set_topic(channel, topic);
                    self.hub.publish(Notification::Topic {
                        channel: channel.clone(),
                        text: topic.clone(),
                    });
                }
                StateChange::System { channel, text } => {
                    self.hub.publish(Notification::System {
                        channel: channel.clone(),
                        text: text.clone(),
                        timestamp: Utc::now(),
                    });
                }
                StateChange::OwnNickChanged { new, .. } => {
                    self.status.nick = Some(new.clone());
                    self.publish_status();
                }
            }
        }

        if applied.channel_list_changed() {
            let channels = state.channel_names();
            metrics::set_channels(channels.len());
            self.hub.set_channels(channels.clone());
            self.hub.publish(Notification::ChannelList { channels });
        }
    }

    /// Append a chat line to `room`'s history and relay it.
    pub fn record_message(&self, room: &str, sender: &str, text: &str, at: DateTime<Utc>) {
        self.hub.push_history(
            room,
            HistoryEntry {
                sender: sender.to_string(),
                text: text.to_string(),
                timestamp: at,
            },
        );
        self.hub.publish(Notification::Message {
            channel: room.to_string(),
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp: at,
        });
    }

    /// Relay a line for observers without storing it.
    pub fn system(&self, channel: &str, text: &str) {
        self.hub.publish(Notification::System {
            channel: channel.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn history_snapshot(&self, channel: &str) -> Vec<HistoryEntry> {
        self.hub.history(channel)
    }

    pub fn roster_snapshot(&self, channel: &str) -> Vec<crate::state::RosterEntry> {
        self.hub.roster(channel)
    }

    pub fn topic_snapshot(&self, channel: &str) -> Option<String> {
        self.hub.topic(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InboundEvent;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    fn drain(rx: &mut broadcast::Receiver<Arc<Envelope>>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            out.push(envelope.notification.clone());
        }
        out
    }

    fn join(channel: &str, nick: &str) -> InboundEvent {
        InboundEvent::Join {
            channel: channel.into(),
            nick: nick.into(),
            hostmask: None,
        }
    }

    fn apply(relay: &mut RelayBroadcaster, state: &mut SessionState, event: InboundEvent) {
        let applied = state.apply(&event);
        relay.publish_changes(state, &applied);
    }

    #[test]
    fn self_join_publishes_channel_list_and_roster() {
        let hub = Hub::new();
        let mut rx = hub.subscribe();
        let mut relay = RelayBroadcaster::new(hub.clone());
        let mut state = SessionState::new("relay");

        apply(&mut relay, &mut state, join("#Rust", "relay"));
        let frames = drain(&mut rx);

        assert!(frames.contains(&Notification::ChannelList {
            channels: vec!["#Rust".into()]
        }));
        assert!(frames.iter().any(|n| matches!(n, Notification::Roster { users, .. } if users.len() == 1)));
        assert!(frames.iter().any(|n| matches!(n, Notification::System { text, .. } if text == "* relay has joined #Rust")));
        assert_eq!(hub.channels(), vec!["#Rust".to_string()]);
        assert_eq!(hub.roster("#rust").len(), 1);
    }

    #[test]
    fn room_is_case_folded() {
        let hub = Hub::new();
        let mut rx = hub.subscribe();
        let relay = RelayBroadcaster::new(hub);
        relay.record_message("#Rust", "alice", "hi", Utc::now());
        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.room.as_deref(), Some("#rust"));
    }

    #[test]
    fn history_is_capped_and_dropped_with_the_channel() {
        let hub = Hub::new();
        let mut relay = RelayBroadcaster::new(hub.clone());
        let mut state = SessionState::new("relay");
        apply(&mut relay, &mut state, join("#c", "relay"));

        for i in 0..=HISTORY_CAPACITY {
            relay.record_message("#c", "alice", &i.to_string(), Utc::now());
        }
        let history = relay.history_snapshot("#C");
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history[0].text, "1");

        apply(
            &mut relay,
            &mut state,
            InboundEvent::Part {
                channel: "#c".into(),
                nick: "relay".into(),
                reason: None,
            },
        );
        assert!(relay.history_snapshot("#c").is_empty());
        assert!(hub.channels().is_empty());
    }

    #[test]
    fn topic_and_nick_changes() {
        let hub = Hub::new();
        let mut relay = RelayBroadcaster::new(hub.clone());
        let mut state = SessionState::new("relay");
        relay.connected("irc.test", 6667, "relay");
        apply(&mut relay, &mut state, join("#c", "relay"));
        apply(
            &mut relay,
            &mut state,
            InboundEvent::Topic {
                channel: "#c".into(),
                nick: Some("op".into()),
                text: "welcome".into(),
            },
        );
        assert_eq!(relay.topic_snapshot("#C").as_deref(), Some("welcome"));

        apply(
            &mut relay,
            &mut state,
            InboundEvent::NickChange {
                old: "relay".into(),
                new: "relay2".into(),
            },
        );
        assert_eq!(hub.status().nick.as_deref(), Some("relay2"));
        assert_eq!(relay.roster_snapshot("#c")[0].nick, "relay2");
    }

    #[test]
    fn disconnect_clears_channels_but_keeps_history() {
        let hub = Hub::new();
        let mut relay = RelayBroadcaster::new(hub.clone());
        let mut state = SessionState::new("relay");
        relay.connected("irc.test", 6667, "relay");
        apply(&mut relay, &mut state, join("#c", "relay"));
        relay.record_message("#c", "alice", "hi", Utc::now());

        let mut rx = hub.subscribe();
        relay.disconnected();
        let frames = drain(&mut rx);
        assert_eq!(frames[0], Notification::disconnected());
        assert_eq!(frames[1], Notification::ChannelList { channels: vec![] });
        assert!(hub.channels().is_empty());
        assert!(hub.roster("#c").is_empty());
        assert_eq!(hub.history("#c").len(), 1);
    }

    #[test]
    fn intents_map_to_commands() {
        let intent = Intent::SetTopic {
            channel: "#c".into(),
            text: "new".into(),
        };
        assert_eq!(
            intent.to_command(),
            OutboundCommand::Topic {
                channel: "#c".into(),
                text: Some("new".into())
            }
        );
        assert_eq!(
            Intent::ListRoster { channel: "#c".into() }.to_command(),
            OutboundCommand::Names { channel: "#c".into() }
        );
    }

    #[test]
    fn query_rooms_are_capped_oldest_first() {
        let hub = Hub::new();
        let mut relay = RelayBroadcaster::new(hub.clone());
        let now = Utc::now();

        for i in 0..MAX_QUERY_ROOMS + 500 {
            let nick = format!("user{i}");
            relay.record_message(&nick, &nick, "hi", now);
        }
        relay.record_message("#c", "alice", "channel line", now);
        relay.disconnected();

        assert_eq!(hub.query_room_count(), MAX_QUERY_ROOMS);
        assert!(hub.history("user0").is_empty());
        assert_eq!(hub.history(&format!("user{}", MAX_QUERY_ROOMS + 499)).len(), 1);
        assert_eq!(hub.history("#c").len(), 1);
    }

    #[test]
    fn active_query_room_survives_eviction() {
        let hub = Hub::new();
        let relay = RelayBroadcaster::new(hub.clone());
        let now = Utc::now();

        relay.record_message("Regular", "Regular", "first", now);
        for i in 0..MAX_QUERY_ROOMS - 1 {
            let nick = format!("user{i}");
            relay.record_message(&nick, &nick, "hi", now);
        }
        relay.record_message("regular", "regular", "again", now);
        relay.record_message("newcomer", "newcomer", "hi", now);

        assert_eq!(hub.history("REGULAR").len(), 2);
        assert!(hub.history("user0").is_empty());
    }
}
