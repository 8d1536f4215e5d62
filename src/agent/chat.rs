//! Chat-completion client for the annotator.
//!
//! Two wire formats are supported: Ollama's `/api/chat` (local models) and
//! Anthropic's `/v1/messages`. Both reduce to "system prompt + one user
//! message in, text out".

use crate::config::ModelConfig;
use crate::error::LlmError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Which chat API to speak.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Ollama `/api/chat` (default)
    #[default]
    Ollama,
    /// Anthropic Messages API
    Anthropic,
}

impl LlmProvider {
    pub const ALL: [LlmProvider; 2] = [LlmProvider::Ollama, LlmProvider::Anthropic];

    pub fn requires_api_key(&self) -> bool {
        matches!(self, LlmProvider::Anthropic)
    }

    /// Base URL used when none is configured.
    pub fn default_url(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Anthropic => "https://api.anthropic.com",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "llama3.2:latest",
            LlmProvider::Anthropic => "claude-3-5-haiku-latest",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::Ollama => write!(f, "ollama"),
            LlmProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Message in a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Anthropic Messages API request.
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<ChatMessage>,
}

/// Anthropic Messages API response.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Client for a single configured model.
pub struct ChatClient {
    config: ModelConfig,
    http_client: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: ModelConfig) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.config.name
    }

    /// Send one prompt and return the model's text reply.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        debug!(
            "Sending {} prompt ({} chars) to {}",
            self.config.provider,
            prompt.len(),
            self.config.name
        );

        match self.config.provider {
            LlmProvider::Ollama => self.complete_ollama(system, prompt).await,
            LlmProvider::Anthropic => self.complete_anthropic(system, prompt).await,
        }
    }

    async fn complete_ollama(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.config.url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: self.config.name.clone(),
            messages: vec![
                ChatMessage::new("system", system),
                ChatMessage::new("user", prompt),
            ],
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = check_status(response).await?;
        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        Ok(chat_response.message.content)
    }

    async fn complete_anthropic(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.config.url.trim_end_matches('/'));

        let request = AnthropicRequest {
            model: self.config.name.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: system.to_string(),
            messages: vec![ChatMessage::new("user", prompt)],
        };

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", self.config.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = check_status(response).await?;
        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        Ok(anthropic_text(&body))
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.config.timeout_seconds)
        } else if e.is_connect() {
            LlmError::Connect(self.config.url.clone())
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Api { status, body })
}

/// Concatenate the text blocks of an Anthropic reply.
fn anthropic_text(response: &AnthropicResponse) -> String {
    response
        .content
        .iter()
        .filter(|c| c.kind == "text")
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("")
}
