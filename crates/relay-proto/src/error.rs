//! Error types for line parsing and framing.

use thiserror::Error;

/// Errors raised while reading or decoding IRC lines.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty line")]
    EmptyLine,

    #[error("invalid command in line: {0:?}")]
    InvalidCommand(String),

    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Static label for logs and metrics.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyLine => "empty_line",
            Self::InvalidCommand(_) => "invalid_command",
            Self::LineTooLong { .. } => "line_too_long",
            Self::Io(_) => "io",
        }
    }
}
