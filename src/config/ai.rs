//! Conversational backend settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::defaults::{default_ai_timeout, default_max_tokens, default_system_prompt};

/// Which OpenAI-compatible endpoint to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    OpenAi,
    Gemini,
    /// Any other chat-completions endpoint; `endpoint` is required.
    Custom,
}

impl AiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub provider: AiProvider,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Overrides the provider's default chat-completions URL.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Overrides the provider's default model.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
}

impl AiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: AiProvider::default(),
            api_key: None,
            endpoint: None,
            model: None,
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_ai_timeout(),
        }
    }
}
