//! RFC 1459 case mapping.
//!
//! Nicknames and channel names compare case-insensitively, with `[]\~`
//! folding onto `{}|^`. Every map keyed by a nick or channel in the relay
//! goes through [`irc_to_lower`].

/// Fold one character.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        'A'..='Z' => c.to_ascii_lowercase(),
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        _ => c,
    }
}

/// Fold a whole string.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Case-insensitive equality under RFC 1459 folding.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.chars()
            .zip(b.chars())
            .all(|(x, y)| irc_lower_char(x) == irc_lower_char(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_rfc1459_specials() {
        assert_eq!(irc_to_lower("#Rust[Dev]"), "#rust{dev}");
        assert_eq!(irc_to_lower("Back\\Slash~"), "back|slash^");
    }

    #[test]
    fn eq_ignores_case() {
        assert!(irc_eq("RelayBot", "relaybot"));
        assert!(irc_eq("nick[1]", "NICK{1}"));
        assert!(!irc_eq("nick", "nick_"));
    }

    #[test]
    fn non_ascii_passes_through() {
        assert_eq!(irc_to_lower("ÄBC"), "Äbc");
    }
}
