//! Per-channel roster and member privileges.

use relay_proto::irc_to_lower;
use relay_proto::mode::PREFIX_MODES;
use serde::Serialize;
use std::collections::BTreeMap;

/// Channel privileges of one member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberModes {
    pub owner: bool,  // +q (~)
    pub admin: bool,  // +a (&)
    pub op: bool,     // +o (@)
    pub halfop: bool, // +h (%)
    pub voice: bool,  // +v (+)
}

impl MemberModes {
    /// Parse the sigils in front of a names entry. Unknown characters are ignored.
    pub fn from_prefixes(prefixes: &str) -> Self {
        let mut modes = Self::default();
        for sigil in prefixes.chars() {
            if let Some(&(mode, _)) = PREFIX_MODES.iter().find(|(_, s)| *s == sigil) {
                modes.set(mode, true);
            }
        }
        modes
    }

    /// Apply a `+x`/`-x` prefix mode. Returns whether `mode` is a prefix mode.
    pub fn set(&mut self, mode: char, on: bool) -> bool {
        let slot = match mode {
            'q' => &mut self.owner,
            'a' => &mut self.admin,
            'o' => &mut self.op,
            'h' => &mut self.halfop,
            'v' => &mut self.voice,
            _ => return false,
        };
        *slot = on;
        true
    }

    /// Highest prefix character. Priority: ~ > & > @ > % > +
    pub fn prefix_char(&self) -> Option<char> {
        [
            (self.owner, '~'),
            (self.admin, '&'),
            (self.op, '@'),
            (self.halfop, '%'),
            (self.voice, '+'),
        ]
        .into_iter()
        .find_map(|(set, c)| set.then_some(c))
    }

    /// 0 for no privileges, 5 for owner. Used to order rosters.
    pub fn rank(&self) -> u8 {
        match self.prefix_char() {
            Some('~') => 5,
            Some('&') => 4,
            Some('@') => 3,
            Some('%') => 2,
            Some('+') => 1,
            _ => 0,
        }
    }
}

/// Split a names-reply entry into its sigils and the bare nick.
pub fn split_names_entry(entry: &str) -> (MemberModes, &str) {
    let nick = entry.trim_start_matches(|c: char| PREFIX_MODES.iter().any(|(_, s)| *s == c));
    let prefixes = &entry[..entry.len() - nick.len()];
    // Some servers send full hostmasks with userhost-in-names.
    let nick = nick.split('!').next().unwrap_or(nick);
    (MemberModes::from_prefixes(prefixes), nick)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Nick as last seen on the wire.
    pub nick: String,
    pub modes: MemberModes,
    /// `user@host`, once the server has told us.
    pub hostmask: Option<String>,
}

/// What observers see for one roster line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub nick: String,
    /// Highest sigil, or empty.
    pub mode: String,
}

/// A channel the session is in.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    members: BTreeMap<String, Member>,
}

impl Channel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member(&self, nick: &str) -> Option<&Member> {
        self.members.get(&irc_to_lower(nick))
    }

    pub fn member_mut(&mut self, nick: &str) -> Option<&mut Member> {
        self.members.get_mut(&irc_to_lower(nick))
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Insert or replace a member.
    pub fn insert(&mut self, member: Member) {
        self.members.insert(irc_to_lower(&member.nick), member);
    }

    pub fn remove(&mut self, nick: &str) -> Option<Member> {
        self.members.remove(&irc_to_lower(nick))
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Roster ordered by privilege, then case-insensitively by nick.
    pub fn roster(&self) -> Vec<RosterEntry> {
        let mut members: Vec<&Member> = self.members.values().collect();
        members.sort_by(|a, b| b.modes.rank().cmp(&a.modes.rank()));
        members
            .into_iter()
            .map(|m| RosterEntry {
                nick: m.nick.clone(),
                mode: m.modes.prefix_char().map(String::from).unwrap_or_default(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_entry_sigils() {
        let (modes, nick) = split_names_entry("@+alice");
        assert_eq!(nick, "alice");
        assert!(modes.op && modes.voice);
        assert_eq!(modes.prefix_char(), Some('@'));

        let (modes, nick) = split_names_entry("bob");
        assert_eq!(nick, "bob");
        assert_eq!(modes.prefix_char(), None);

        let (_, nick) = split_names_entry("~carol!c@host");
        assert_eq!(nick, "carol");
    }

    #[test]
    fn removing_op_falls_back_to_voice() {
        let mut modes = MemberModes::from_prefixes("@+");
        assert!(modes.set('o', false));
        assert_eq!(modes.prefix_char(), Some('+'));
        assert!(!modes.set('b', true));
    }

    #[test]
    fn roster_orders_by_rank_then_nick() {
        let mut chan = Channel::new("#c");
        for (nick, prefixes) in [("zed", "@"), ("amy", ""), ("Bob", "+"), ("al", "@")] {
            chan.insert(Member {
                nick: nick.into(),
                modes: MemberModes::from_prefixes(prefixes),
                hostmask: None,
            });
        }
        let roster: Vec<String> = chan
            .roster()
            .into_iter()
            .map(|e| format!("{}{}", e.mode, e.nick))
            .collect();
        assert_eq!(roster, vec!["@al", "@zed", "+Bob", "amy"]);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut chan = Channel::new("#c");
        chan.insert(Member {
            nick: "Nick[1]".into(),
            modes: MemberModes::default(),
            hostmask: None,
        });
        assert!(chan.member("nick{1}").is_some());
        assert!(chan.remove("NICK[1]").is_some());
        assert!(chan.is_empty());
    }
}
