//! Chat-completion client for the hosted text-generation service.
//!
//! Speaks the OpenAI-compatible `/chat/completions` protocol over HTTP.
//! Every call is bounded by a timeout; transport failures surface as
//! `ModelUnavailable` and deadline misses as `Timeout`, both attributed to
//! the calling stage. One bounded retry on retryable failures, nothing more.

use crate::error::{AgentError, AgentResult, StageKind};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Default chat-completions endpoint base.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";

/// Default per-call timeout in seconds.
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

/// Default sampling temperature. Low on purpose: SQL generation wants
/// determinism, not creativity.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Default completion token cap.
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// A stateless chat exchange with the model. Implementations must not retain
/// memory of prior turns; each call carries everything the stage needs.
pub trait ChatModel: Send + Sync {
    /// Send one system+user prompt pair and return the raw completion text.
    fn chat(
        &self,
        stage: StageKind,
        system: &str,
        user: &str,
    ) -> impl std::future::Future<Output = AgentResult<String>> + Send;
}

/// Connection settings for the hosted model.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiClient {
    http: reqwest::Client,
    config: LlmConfig,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiClient {
    /// Build a client from config. Fails on an unparsable base URL.
    pub fn new(config: LlmConfig) -> AgentResult<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            AgentError::invalid_input(format!("Invalid LLM base URL '{}': {}", config.base_url, e))
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn send_once(
        &self,
        stage: StageKind,
        system: &str,
        user: &str,
    ) -> AgentResult<String> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::timeout(format!("llm call ({})", stage), self.config.timeout_secs)
                } else {
                    AgentError::model_unavailable(stage, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::model_unavailable(
                stage,
                format!("HTTP {}: {}", status, text),
            ));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            AgentError::unparsable(stage, format!("invalid completion JSON: {}", e))
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AgentError::unparsable(stage, "completion contained no choices"))
    }
}

impl ChatModel for OpenAiClient {
    async fn chat(&self, stage: StageKind, system: &str, user: &str) -> AgentResult<String> {
        debug!(stage = %stage, model = %self.config.model, user_len = user.len(), "Calling model");

        match self.send_once(stage, system, user).await {
            Ok(content) => Ok(content),
            Err(err) if err.is_retryable() => {
                warn!(stage = %stage, error = %err, "Model call failed, retrying once");
                self.send_once(stage, system, user).await
            }
            Err(err) => Err(err),
        }
    }
}
