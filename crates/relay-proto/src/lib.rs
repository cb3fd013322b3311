//! Client-side IRC protocol support for slirc-relay.
//!
//! Only the slice of RFC 1459/2812 a single bot session needs:
//!
//! - [`Message`]: owned line representation with a nom-based parser
//! - [`Prefix`]: `nick!user@host` / server-name sources
//! - [`casemap`]: RFC 1459 case folding
//! - [`mode`]: MODE line expansion
//! - [`wildcard`]: `*`/`?` mask matching used for channel bans
//! - [`IrcCodec`]: tokio-util codec producing [`Message`] values
//! - [`response`]: the numerics the relay reacts to

pub mod casemap;
pub mod codec;
pub mod error;
pub mod message;
pub mod mode;
pub mod prefix;
pub mod response;
pub mod wildcard;

pub use casemap::{irc_eq, irc_lower_char, irc_to_lower};
pub use codec::IrcCodec;
pub use error::ProtocolError;
pub use message::{is_channel_name, split_text, Message};
pub use mode::{parse_mode_changes, ModeChange};
pub use prefix::Prefix;
pub use wildcard::{matches_hostmask, wildcard_match};
