//! slirc-relay - Straylight IRC relay.
//!
//! One upstream IRC session with channel moderation, command plugins and an
//! AI conversation tracker, relayed live to web observers over WebSocket.

pub mod adapter;
pub mod ai;
pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod http;
pub mod metrics;
pub mod moderation;
pub mod network;
pub mod plugins;
pub mod relay;
pub mod session;
pub mod state;
pub mod storage;
pub mod telemetry;
