//! Unified error handling for slirc-relay.
//!
//! Each subsystem has its own error enum with a static `error_code()` used
//! as a metrics label. `StorageError` lives next to sqlx in `storage`, and
//! `ConfigError` next to the TOML loader in `config`.

use relay_proto::ProtocolError;
use thiserror::Error;

use crate::storage::StorageError;

// ============================================================================
// Session lifecycle
// ============================================================================

/// Errors from connect / disconnect / reconnect requests.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a connect or reconnect is already in progress")]
    ConnectInProgress,

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    /// The session actor has stopped and no longer accepts input.
    #[error("session closed")]
    Closed,

    #[error("timed out waiting for the session to stop")]
    ShutdownTimeout,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectInProgress => "connect_in_progress",
            Self::AlreadyConnected => "already_connected",
            Self::NotConnected => "not_connected",
            Self::Closed => "session_closed",
            Self::ShutdownTimeout => "shutdown_timeout",
            Self::Storage(e) => e.error_code(),
        }
    }
}

// ============================================================================
// Protocol adapter
// ============================================================================

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {0}")]
    Timeout(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gave up after {0} connection attempts")]
    GaveUp(u32),

    #[error("server rejected nickname '{0}' as erroneous")]
    NickRejected(String),

    #[error("no free nickname after {0} alternates")]
    NickExhausted(u32),
}

impl AdapterError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect_failed",
            Self::Timeout(_) => "connect_timeout",
            Self::Tls(_) => "tls",
            Self::Protocol(e) => e.error_code(),
            Self::Io(_) => "io",
            Self::GaveUp(_) => "gave_up",
            Self::NickRejected(_) => "nick_rejected",
            Self::NickExhausted(_) => "nick_exhausted",
        }
    }
}

// ============================================================================
// Plugins
// ============================================================================

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("no plugin kind named '{0}'")]
    UnknownKind(String),

    #[error("module {module} failed to construct: {reason}")]
    Construction { module: String, reason: String },

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The session behind the send capability is gone.
    #[error("session is no longer accepting messages")]
    SenderClosed,
}

impl PluginError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownKind(_) => "unknown_kind",
            Self::Construction { .. } => "construction",
            Self::Handler(_) => "handler",
            Self::Panicked(_) => "panic",
            Self::SenderClosed => "sender_closed",
        }
    }
}

// ============================================================================
// Conversational backend
// ============================================================================

#[derive(Debug, Error)]
pub enum AiError {
    #[error("conversational backend is disabled")]
    Disabled,

    #[error("no API key configured for {0}")]
    MissingApiKey(&'static str),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend returned no content")]
    EmptyResponse,
}

impl AiError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::MissingApiKey(_) => "missing_api_key",
            Self::Http(e) if e.is_timeout() => "timeout",
            Self::Http(_) => "http",
            Self::Status { .. } => "status",
            Self::EmptyResponse => "empty",
        }
    }
}

// ============================================================================
// Observer gateway
// ============================================================================

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),
}

impl GatewayError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Bind { .. } => "bind",
            Self::WebSocket(_) => "websocket",
            Self::InvalidFrame(_) => "invalid_frame",
        }
    }
}
