//! `*` / `?` mask matching.

use crate::casemap::irc_lower_char;

/// Match `text` against a glob `pattern` (`*` any run, `?` one char).
///
/// Comparison is case-insensitive under RFC 1459 folding.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(irc_lower_char).collect();
    let text: Vec<char> = text.chars().map(irc_lower_char).collect();

    let (mut p, mut t) = (0usize, 0usize);
    // Last `*` seen in the pattern and the text offset it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, from)) => {
                    p = star + 1;
                    t = from + 1;
                    backtrack = Some((star, from + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Match a full `nick!user@host` string against a ban mask.
#[inline]
pub fn matches_hostmask(mask: &str, hostmask: &str) -> bool {
    wildcard_match(mask, hostmask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_and_question() {
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("sp?m*", "spammer"));
        assert!(wildcard_match("*bot", "relaybot"));
        assert!(!wildcard_match("?", ""));
        assert!(!wildcard_match("abc", "abcd"));
    }

    #[test]
    fn backtracks_across_stars() {
        assert!(wildcard_match("*a*b*c", "xxaxxbxxbxc"));
        assert!(!wildcard_match("*a*b*c", "xxaxxbxx"));
    }

    #[test]
    fn case_insensitive() {
        assert!(wildcard_match("*!*@*.EXAMPLE.com", "Nick!user@host.example.COM"));
        assert!(matches_hostmask("troll[*]!*@*", "TROLL{42}!x@y"));
    }
}
