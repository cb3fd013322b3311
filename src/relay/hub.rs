//! Fan-out to observers plus the snapshot cache they read on subscribe.
//!
//! Only the session actor writes; observer tasks take brief read locks to
//! copy what they need.

use parking_lot::RwLock;
use relay_proto::{irc_to_lower, is_channel_name};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::history::{HistoryBuffer, HistoryEntry};
use super::notification::Notification;
use crate::state::RosterEntry;

/// Broadcast queue depth per observer before it starts lagging.
pub const HUB_CAPACITY: usize = 1024;

/// Private-message rooms kept with history. The least recently active is
/// evicted first.
pub const MAX_QUERY_ROOMS: usize = 64;

/// A notification plus its case-folded room.
#[derive(Debug)]
pub struct Envelope {
    pub room: Option<String>,
    pub notification: Notification,
}

/// Connection status as last published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub connected: bool,
    pub server: Option<String>,
    pub port: Option<u16>,
    pub nick: Option<String>,
}

impl Status {
    pub fn to_notification(&self) -> Notification {
        Notification::Status {
            connected: self.connected,
            server: self.server.clone(),
            port: self.port,
            nick: self.nick.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    status: Status,
    channels: Vec<String>,
    rosters: HashMap<String, Vec<RosterEntry>>,
    topics: HashMap<String, String>,
    history: HashMap<String, HistoryBuffer>,
    /// Folded query room names, least recently active first.
    query_rooms: VecDeque<String>,
}

impl Snapshot {
    /// Mark a query room active, evicting the oldest beyond the cap.
    fn touch_query_room(&mut self, folded: &str) {
        if let Some(pos) = self.query_rooms.iter().position(|r| r == folded) {
            self.query_rooms.remove(pos);
        }
        self.query_rooms.push_back(folded.to_string());
        while self.query_rooms.len() > MAX_QUERY_ROOMS {
            if let Some(oldest) = self.query_rooms.pop_front() {
                self.history.remove(&oldest);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Hub {
    tx: broadcast::Sender<Arc<Envelope>>,
    snapshot: Arc<RwLock<Snapshot>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self {
            tx,
            snapshot: Arc::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Send to every subscriber. No subscribers is not an error.
    pub fn publish(&self, notification: Notification) {
        let room = notification.room().map(irc_to_lower);
        let _ = self.tx.send(Arc::new(Envelope { room, notification }));
    }

    // ========================================================================
    // Snapshot reads
    // ========================================================================

    pub fn status(&self) -> Status {
        self.snapshot.read().status.clone()
    }

    pub fn channels(&self) -> Vec<String> {
        self.snapshot.read().channels.clone()
    }

    /// Display name of a joined channel, matched case-insensitively.
    pub fn find_channel(&self, name: &str) -> Option<String> {
        let folded = irc_to_lower(name);
        self.snapshot
            .read()
            .channels
            .iter()
            .find(|c| irc_to_lower(c) == folded)
            .cloned()
    }

    pub fn roster(&self, channel: &str) -> Vec<RosterEntry> {
        self.snapshot
            .read()
            .rosters
            .get(&irc_to_lower(channel))
            .cloned()
            .unwrap_or_default()
    }

    pub fn topic(&self, channel: &str) -> Option<String> {
        self.snapshot.read().topics.get(&irc_to_lower(channel)).cloned()
    }

    pub fn history(&self, channel: &str) -> Vec<HistoryEntry> {
        self.snapshot
            .read()
            .history
            .get(&irc_to_lower(channel))
            .map(HistoryBuffer::snapshot)
            .unwrap_or_default()
    }

    // ========================================================================
    // Snapshot writes (session actor only)
    // ========================================================================

    pub(super) fn set_status(&self, status: Status) {
        self.snapshot.write().status = status;
    }

    pub(super) fn set_channels(&self, channels: Vec<String>) {
        self.snapshot.write().channels = channels;
    }

    pub(super) fn set_roster(&self, channel: &str, roster: Vec<RosterEntry>) {
        self.snapshot.write().rosters.insert(irc_to_lower(channel), roster);
    }

    pub(super) fn set_topic(&self, channel: &str, topic: &str) {
        self.snapshot
            .write()
            .topics
            .insert(irc_to_lower(channel), topic.to_string());
    }

    pub(super) fn push_history(&self, room: &str, entry: HistoryEntry) {
        let folded = irc_to_lower(room);
        let mut snapshot = self.snapshot.write();
        if !is_channel_name(room) {
            snapshot.touch_query_room(&folded);
        }
        snapshot.history.entry(folded).or_default().push(entry);
    }

    pub fn query_room_count(&self) -> usize {
        self.snapshot.read().query_rooms.len()
    }

    /// Forget everything cached for a channel the session left.
    pub(super) fn drop_channel(&self, channel: &str) {
        let folded = irc_to_lower(channel);
        let mut snapshot = self.snapshot.write();
        snapshot.rosters.remove(&folded);
        snapshot.topics.remove(&folded);
        snapshot.history.remove(&folded);
    }

    /// Clear rosters, topics and the channel list. History survives so a
    /// reconnect can show what was said before.
    pub(super) fn reset_session(&self) {
        let mut snapshot = self.snapshot.write();
        snapshot.channels.clear();
        snapshot.rosters.clear();
        snapshot.topics.clear();
    }
}
