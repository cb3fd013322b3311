//! Message sources.

use std::fmt;

/// The `:source` of a message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Prefix {
    /// A server name such as `irc.libera.chat`.
    Server(String),
    /// A user source. `user` and `host` are absent when the server only sent a nick.
    User {
        nick: String,
        user: Option<String>,
        host: Option<String>,
    },
}

impl Prefix {
    /// Lenient parse; never fails.
    ///
    /// A source with `!` or `@` is a user. A bare token containing a dot is a
    /// server. Anything else is treated as a bare nick.
    pub fn parse(raw: &str) -> Self {
        let (name, rest) = match raw.find(['!', '@']) {
            Some(idx) => (&raw[..idx], Some(&raw[idx..])),
            None => (raw, None),
        };

        let Some(rest) = rest else {
            return if name.contains('.') {
                Prefix::Server(name.to_string())
            } else {
                Prefix::User {
                    nick: name.to_string(),
                    user: None,
                    host: None,
                }
            };
        };

        let (user, host) = match rest.strip_prefix('!') {
            Some(after_bang) => match after_bang.split_once('@') {
                Some((u, h)) => (Some(u), Some(h)),
                None => (Some(after_bang), None),
            },
            None => (None, rest.strip_prefix('@')),
        };

        Prefix::User {
            nick: name.to_string(),
            user: user.filter(|u| !u.is_empty()).map(str::to_string),
            host: host.filter(|h| !h.is_empty()).map(str::to_string),
        }
    }

    /// Build a full user prefix.
    pub fn user(nick: &str, user: &str, host: &str) -> Self {
        Prefix::User {
            nick: nick.to_string(),
            user: Some(user.to_string()),
            host: Some(host.to_string()),
        }
    }

    pub fn nick(&self) -> Option<&str> {
        match self {
            Prefix::User { nick, .. } if !nick.is_empty() => Some(nick),
            _ => None,
        }
    }

    /// `user@host` when both parts are known.
    pub fn user_host(&self) -> Option<String> {
        match self {
            Prefix::User {
                user: Some(user),
                host: Some(host),
                ..
            } => Some(format!("{user}@{host}")),
            _ => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Server(name) => f.write_str(name),
            Prefix::User { nick, user, host } => {
                f.write_str(nick)?;
                if let Some(user) = user {
                    write!(f, "!{user}")?;
                }
                if let Some(host) = host {
                    write!(f, "@{host}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_user_prefix() {
        let p = Prefix::parse("alice!~al@host.example");
        assert_eq!(p.nick(), Some("alice"));
        assert_eq!(p.user_host().as_deref(), Some("~al@host.example"));
        assert_eq!(p.to_string(), "alice!~al@host.example");
    }

    #[test]
    fn server_and_bare_nick() {
        assert_eq!(
            Prefix::parse("irc.example.net"),
            Prefix::Server("irc.example.net".into())
        );
        let bare = Prefix::parse("bob");
        assert_eq!(bare.nick(), Some("bob"));
        assert_eq!(bare.user_host(), None);
    }

    #[test]
    fn host_without_user() {
        let p = Prefix::parse("carol@10.0.0.1");
        assert_eq!(p.nick(), Some("carol"));
        assert_eq!(p.user_host(), None);
        assert_eq!(p.to_string(), "carol@10.0.0.1");
    }
}
