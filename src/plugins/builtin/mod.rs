//! Handlers shipped with the relay.

pub mod coffee;
pub mod echo;
pub mod url_title;
