//! Applying `+b` masks to the roster we know about.

use relay_proto::wildcard_match;

/// Whether a ban `mask` covers a member.
///
/// `hostmask` is the member's `user@host` if we have seen it. When it is
/// unknown, only masks whose `user@host` half is pure wildcard can match.
/// Extended bans (`$a:account` and friends) never match locally.
pub fn ban_matches(mask: &str, nick: &str, hostmask: Option<&str>) -> bool {
    if mask.is_empty() || mask.starts_with('$') {
        return false;
    }

    let (nick_mask, userhost_mask) = match mask.split_once('!') {
        Some((n, rest)) => (n, Some(rest)),
        None if mask.contains('@') => ("*", Some(mask)),
        None => (mask, None),
    };

    if !wildcard_match(nick_mask, nick) {
        return false;
    }

    match (userhost_mask, hostmask) {
        (None, _) => true,
        (Some(pattern), Some(known)) => wildcard_match(pattern, known),
        (Some(pattern), None) => pattern.chars().all(|c| c == '*' || c == '@'),
    }
}
