//! Owned IRC messages and the nom line parser.
//!
//! ```text
//! [@tags] [:prefix] <command> [params...] [:trailing]
//! ```

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::{take_till1, take_until, take_while1},
    character::complete::{char, space0},
    combinator::opt,
    sequence::preceded,
    IResult,
};

use crate::error::ProtocolError;
use crate::prefix::Prefix;

/// RFC 2812 caps a message at 15 parameters.
const MAX_PARAMS: usize = 15;

/// Bytes of text per PRIVMSG chunk; leaves room for the source prefix the
/// server prepends when relaying.
pub const MAX_TEXT_BYTES: usize = 400;

/// One IRC line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Raw IRCv3 tag section without the leading `@`. The relay never
    /// interprets tags; they are preserved for logging.
    pub tags: Option<String>,
    pub prefix: Option<Prefix>,
    /// Upper-cased command or three-digit numeric.
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    pub fn new<I, S>(command: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: None,
            prefix: None,
            command: command.to_ascii_uppercase(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// Parameter at `idx`, if present.
    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    /// Last parameter; for most commands the free-text trailing part.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Nick of the user that sent this message.
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nick)
    }

    // ------------------------------------------------------------------
    // Builders for the commands a client session sends
    // ------------------------------------------------------------------

    pub fn nick(nick: &str) -> Self {
        Self::new("NICK", [nick])
    }

    pub fn user(username: &str, realname: &str) -> Self {
        Self::new("USER", [username, "0", "*", realname])
    }

    pub fn pong(token: &str) -> Self {
        Self::new("PONG", [token])
    }

    pub fn join(channel: &str) -> Self {
        Self::new("JOIN", [channel])
    }

    pub fn part(channel: &str, reason: Option<&str>) -> Self {
        match reason {
            Some(reason) => Self::new("PART", [channel, reason]),
            None => Self::new("PART", [channel]),
        }
    }

    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new("PRIVMSG", [target, text])
    }

    /// `TOPIC #chan` queries, `TOPIC #chan :text` sets.
    pub fn topic(channel: &str, text: Option<&str>) -> Self {
        match text {
            Some(text) => Self::new("TOPIC", [channel, text]),
            None => Self::new("TOPIC", [channel]),
        }
    }

    pub fn kick(channel: &str, nick: &str, reason: &str) -> Self {
        Self::new("KICK", [channel, nick, reason])
    }

    pub fn mode(target: &str, modes: &str) -> Self {
        Self::new("MODE", [target, modes])
    }

    pub fn names(channel: &str) -> Self {
        Self::new("NAMES", [channel])
    }

    pub fn quit(reason: &str) -> Self {
        Self::new("QUIT", [reason])
    }
}

/// Whether `target` names a channel rather than a nick.
pub fn is_channel_name(target: &str) -> bool {
    matches!(target.chars().next(), Some('#' | '&' | '+' | '!'))
}

/// Split outgoing text into PRIVMSG-sized lines.
///
/// Embedded newlines start a new line, blank lines are dropped, and long
/// lines are cut on a char boundary, preferring the last space.
pub fn split_text(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let mut rest = line.trim_end();
        while rest.len() > MAX_TEXT_BYTES {
            let mut cut = MAX_TEXT_BYTES;
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            if let Some(space) = rest[..cut].rfind(' ').filter(|&i| i > 0) {
                cut = space;
            }
            out.push(rest[..cut].to_string());
            rest = rest[cut..].trim_start();
        }
        if !rest.trim().is_empty() {
            out.push(rest.to_string());
        }
    }
    out
}

// ----------------------------------------------------------------------
// Parsing
// ----------------------------------------------------------------------

fn parse_tags(input: &str) -> IResult<&str, &str> {
    preceded(char('@'), take_until(" "))(input)
}

fn parse_prefix(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_till1(|c| c == ' '))(input)
}

/// `1*letter / 3digit`
fn parse_command(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric())(input)
}

fn valid_command(cmd: &str) -> bool {
    cmd.bytes().all(|b| b.is_ascii_alphabetic())
        || (cmd.len() == 3 && cmd.bytes().all(|b| b.is_ascii_digit()))
}

fn parse_params(mut rest: &str) -> Vec<String> {
    let mut params = Vec::new();
    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing.to_string());
            break;
        }
        if params.len() == MAX_PARAMS - 1 {
            // Anything past the 14th middle param is one final param.
            params.push(rest.to_string());
            break;
        }
        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    params
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(ProtocolError::EmptyLine);
        }

        let invalid = || ProtocolError::InvalidCommand(line.to_string());

        let (input, tags) = opt(parse_tags)(line).map_err(|_| invalid())?;
        let (input, _) = space0::<_, nom::error::Error<&str>>(input).map_err(|_| invalid())?;
        let (input, prefix) = opt(parse_prefix)(input).map_err(|_| invalid())?;
        let (input, _) = space0::<_, nom::error::Error<&str>>(input).map_err(|_| invalid())?;
        let (input, command) = parse_command(input).map_err(|_| invalid())?;

        if !valid_command(command) || !(input.is_empty() || input.starts_with(' ')) {
            return Err(invalid());
        }

        Ok(Message {
            tags: tags.map(str::to_string),
            prefix: prefix.map(Prefix::parse),
            command: command.to_ascii_uppercase(),
            params: parse_params(input),
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tags) = &self.tags {
            write!(f, "@{tags} ")?;
        }
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;

        let Some((last, middle)) = self.params.split_last() else {
            return Ok(());
        };
        for param in middle {
            write!(f, " {param}")?;
        }
        if last.is_empty() || last.contains(' ') || last.starts_with(':') {
            write!(f, " :{last}")
        } else {
            write!(f, " {last}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_privmsg_with_prefix() {
        let msg: Message = ":alice!a@host PRIVMSG #rust :hello there\r\n".parse().unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.source_nick(), Some("alice"));
        assert_eq!(msg.params, vec!["#rust", "hello there"]);
    }

    #[test]
    fn parses_tags_and_numeric() {
        let msg: Message = "@time=2024-01-01T00:00:00Z :irc.test 353 bot = #c :@op +v plain"
            .parse()
            .unwrap();
        assert_eq!(msg.tags.as_deref(), Some("time=2024-01-01T00:00:00Z"));
        assert_eq!(msg.prefix, Some(Prefix::Server("irc.test".into())));
        assert_eq!(msg.command, "353");
        assert_eq!(msg.trailing(), Some("@op +v plain"));
    }

    #[test]
    fn lowercase_command_is_normalized() {
        let msg: Message = "ping :token".parse().unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.param(0), Some("token"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!("".parse::<Message>(), Err(ProtocolError::EmptyLine)));
        assert!("   ".parse::<Message>().is_err());
        assert!(":onlyprefix".parse::<Message>().is_err());
        assert!("12 foo".parse::<Message>().is_err());
        assert!("PRIV-MSG x".parse::<Message>().is_err());
    }

    #[test]
    fn collapses_extra_spaces_between_params() {
        let msg: Message = "MODE  #c   +o    nick".parse().unwrap();
        assert_eq!(msg.params, vec!["#c", "+o", "nick"]);
    }

    #[test]
    fn display_adds_trailing_colon_when_needed() {
        assert_eq!(
            Message::privmsg("#c", "two words").to_string(),
            "PRIVMSG #c :two words"
        );
        assert_eq!(Message::join("#c").to_string(), "JOIN #c");
        assert_eq!(Message::topic("#c", Some("")).to_string(), "TOPIC #c :");
        assert_eq!(
            Message::user("relay", "Relay Bot").to_string(),
            "USER relay 0 * :Relay Bot"
        );
    }

    #[test]
    fn channel_names() {
        assert!(is_channel_name("#rust"));
        assert!(is_channel_name("&local"));
        assert!(!is_channel_name("alice"));
        assert!(!is_channel_name(""));
    }

    #[test]
    fn split_text_handles_newlines_and_length() {
        assert_eq!(split_text("one\n\ntwo\n"), vec!["one", "two"]);

        let long = "word ".repeat(200);
        let chunks = split_text(&long);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= MAX_TEXT_BYTES));
        assert!(chunks.iter().all(|c| !c.starts_with(' ')));
    }
}
