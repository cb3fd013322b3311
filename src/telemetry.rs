//! Tracing setup and span constructors.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Install the global subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for one upstream session (actor and adapter).
    pub fn session(server: &str, nick: &str) -> Span {
        info_span!("session", server = %server, nick = %nick)
    }

    /// Span for a web observer connection.
    pub fn observer(id: &str, addr: &str) -> Span {
        info_span!("observer", id = %id, addr = %addr)
    }

    /// Span for a plugin invocation.
    pub fn plugin(module_id: i64, name: &str, stage: &str) -> Span {
        info_span!("plugin", module_id, name = %name, stage = %stage)
    }
}
