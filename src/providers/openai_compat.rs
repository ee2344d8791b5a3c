//! OpenAI-compatible chat provider
//!
//! Works with any API that implements the OpenAI chat completions format
//! and accepts multipart (text + image) message content, e.g. OpenAI itself
//! or a local server exposing the same endpoint.
//!
//! Messages are forwarded exactly as the client sent them. Plain string and
//! part-list content already match the upstream wire format, so there is no
//! role re-mapping or content rewriting here.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::conversation::Message;

use super::{check_status, ProviderError};

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone)]
pub struct OpenAICompatConfig {
    /// Base URL for the API (e.g., https://api.openai.com/v1)
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl OpenAICompatConfig {
    /// Build from server configuration; fails when no API key is configured
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("OPENAI_API_KEY is not set".into()))?;

        Ok(Self {
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.settings.chat.model.clone(),
            timeout_secs: config.settings.chat.timeout_secs,
        })
    }
}

/// OpenAI-compatible API provider
pub struct OpenAICompatProvider {
    config: OpenAICompatConfig,
    client: Client,
}

impl OpenAICompatProvider {
    pub fn new(config: OpenAICompatConfig, client: Client) -> Self {
        Self { config, client }
    }

    pub fn from_config(config: &Config, client: Client) -> Result<Self, ProviderError> {
        Ok(Self::new(OpenAICompatConfig::from_config(config)?, client))
    }

    /// Send the whole conversation and return the assistant's raw reply text
    pub async fn chat(&self, messages: &[Message]) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
        };

        tracing::debug!(
            "Sending {} message(s) to {} ({})",
            messages.len(),
            url,
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&request)
            .send()
            .await?;

        let body = check_status(response).await?.text().await?;

        let completion: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?
            .message
            .content
            .ok_or_else(|| ProviderError::InvalidResponse("Reply has no text content".to_string()))
    }
}
