//! Conversational backends.
//!
//! The session only sees [`AiBackend`]; which vendor sits behind it is a
//! configuration detail.

mod openai;

pub use openai::OpenAiCompatBackend;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AiConfig;
use crate::conversation::Turn;
use crate::error::AiError;

/// Produces a reply for `prompt` given the earlier turns of a conversation.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Label for logs and metrics.
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &str, history: &[Turn]) -> Result<String, AiError>;
}

/// Backend used when the feature is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledBackend;

#[async_trait]
impl AiBackend for DisabledBackend {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str, _history: &[Turn]) -> Result<String, AiError> {
        Err(AiError::Disabled)
    }
}

/// Build the backend described by `config`.
///
/// A disabled config, or one whose HTTP client cannot be built, yields the
/// [`DisabledBackend`].
pub fn from_config(config: &AiConfig) -> Arc<dyn AiBackend> {
    if !config.enabled {
        return Arc::new(DisabledBackend);
    }
    match OpenAiCompatBackend::from_config(config) {
        Ok(backend) => {
            info!(provider = config.provider.as_str(), model = %backend.model(), "AI backend ready");
            Arc::new(backend)
        }
        Err(e) => {
            warn!(error = %e, "Failed to build AI backend; addressed messages will get an apology");
            Arc::new(DisabledBackend)
        }
    }
}
