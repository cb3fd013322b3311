//! Protocol adapter: the upstream IRC connection.
//!
//! Owns framing, registration, PING and nick collisions, and speaks
//! [`InboundEvent`](crate::event::InboundEvent) /
//! [`OutboundCommand`](crate::event::OutboundCommand) to the session.

mod irc;
mod normalize;
mod tls;

pub use irc::{AdapterHandle, IrcAdapter, MAX_NICK_ATTEMPTS, command_channel};
pub use normalize::Normalizer;
pub use tls::client_config;
