//! Network module.
//!
//! Contains the observer Gateway (WebSocket listener).

mod gateway;

pub use gateway::{ClientFrame, Gateway};
