//! OpenAI-compatible chat-completions backend.
//!
//! Works with OpenAI itself, Gemini's OpenAI-compatible endpoint, and any
//! other server speaking the same request shape.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::AiBackend;
use crate::config::{AiConfig, AiProvider};
use crate::conversation::{Role, Turn};
use crate::error::AiError;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";
const OPENAI_MODEL: &str = "gpt-4o-mini";
const GEMINI_MODEL: &str = "gemini-2.0-flash";

pub struct OpenAiCompatBackend {
    client: Client,
    provider: AiProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    system_prompt: String,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatBackend {
    pub fn from_config(config: &AiConfig) -> Result<Self, AiError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        let (default_url, default_model) = match config.provider {
            AiProvider::OpenAi | AiProvider::Custom => (OPENAI_URL, OPENAI_MODEL),
            AiProvider::Gemini => (GEMINI_URL, GEMINI_MODEL),
        };
        Ok(Self {
            client,
            provider: config.provider,
            endpoint: config.endpoint.clone().unwrap_or_else(|| default_url.to_string()),
            model: config.model.clone().unwrap_or_else(|| default_model.to_string()),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// System prompt first, then history, then the new prompt.
    fn build_request(&self, prompt: &str, history: &[Turn]) -> Value {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(json!({ "role": "system", "content": self.system_prompt }));
        for turn in history {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(json!({ "role": role, "content": turn.content }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
        })
    }
}

#[async_trait]
impl AiBackend for OpenAiCompatBackend {
    fn name(&self) -> &'static str {
        self.provider.as_str()
    }

    async fn generate(&self, prompt: &str, history: &[Turn]) -> Result<String, AiError> {
        // Custom endpoints are often local servers without auth.
        if self.api_key.is_none() && self.provider != AiProvider::Custom {
            return Err(AiError::MissingApiKey(self.provider.as_str()));
        }

        debug!(model = %self.model, endpoint = %self.endpoint, turns = history.len(), "Requesting completion");

        let mut request = self.client.post(&self.endpoint).json(&self.build_request(prompt, history));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(AiError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};

    fn config(provider: AiProvider, endpoint: Option<String>, key: Option<&str>) -> AiConfig {
        AiConfig {
            enabled: true,
            provider,
            api_key: key.map(str::to_string),
            endpoint,
            system_prompt: "be brief".into(),
            max_tokens: 42,
            ..AiConfig::default()
        }
    }

    /// Serves a fixed chat-completions reply that echoes the message count.
    async fn fake_server() -> String {
        async fn handler(Json(body): Json<Value>) -> Json<Value> {
            let count = body["messages"].as_array().map_or(0, Vec::len);
            let last = body["messages"][count - 1]["content"].as_str().unwrap_or("").to_string();
            Json(json!({
                "choices": [{ "message": { "role": "assistant", "content": format!(" {count}:{last} ") } }]
            }))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/v1/chat/completions", post(handler));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/v1/chat/completions")
    }

    #[test]
    fn provider_presets() {
        let gemini = OpenAiCompatBackend::from_config(&config(AiProvider::Gemini, None, Some("k"))).unwrap();
        assert_eq!(gemini.endpoint(), GEMINI_URL);
        assert_eq!(gemini.model(), GEMINI_MODEL);

        let openai = OpenAiCompatBackend::from_config(&config(AiProvider::OpenAi, None, Some("k"))).unwrap();
        assert_eq!(openai.endpoint(), OPENAI_URL);
    }

    #[test]
    fn request_puts_system_prompt_first() {
        let backend = OpenAiCompatBackend::from_config(&config(AiProvider::OpenAi, None, Some("k"))).unwrap();
        let body = backend.build_request("now", &[Turn::user("before"), Turn::assistant("reply")]);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "be brief");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "now");
        assert_eq!(body["max_tokens"], 42);
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let backend = OpenAiCompatBackend::from_config(&config(AiProvider::Gemini, None, None)).unwrap();
        let err = backend.generate("hi", &[]).await.unwrap_err();
        assert!(matches!(err, AiError::MissingApiKey("gemini")));
    }

    #[tokio::test]
    async fn talks_to_a_compatible_server() {
        let url = fake_server().await;
        let backend = OpenAiCompatBackend::from_config(&config(AiProvider::Custom, Some(url), None)).unwrap();
        let reply = backend.generate("ping", &[Turn::user("a"), Turn::assistant("b")]).await.unwrap();
        assert_eq!(reply, "4:ping");
    }

    #[tokio::test]
    async fn http_errors_carry_the_status() {
        let url = fake_server().await.replace("/v1/chat/completions", "/missing");
        let backend = OpenAiCompatBackend::from_config(&config(AiProvider::Custom, Some(url), None)).unwrap();
        let err = backend.generate("ping", &[]).await.unwrap_err();
        assert!(matches!(err, AiError::Status { status: 404, .. }));
    }
}
