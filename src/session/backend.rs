//! HTTP backend for the dispatcher
//!
//! Talks to this crate's own server over `/api/chat` and `/api/generate-image`.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::conversation::{GeneratedAsset, Message};
use crate::routes::{ChatResponse, ErrorBody, GenerateImageResponse};

use super::dispatcher::{Backend, FALLBACK_FAILURE};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Text for the inline failure notice
    pub fn notice(&self) -> String {
        match self {
            BackendError::Server { message, .. } if !message.trim().is_empty() => message.clone(),
            _ => FALLBACK_FAILURE.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    messages: &'a [Message],
    #[serde(rename = "hasImage")]
    has_image: bool,
}

#[derive(Debug, Serialize)]
struct ImagePayload<'a> {
    prompt: &'a str,
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<P: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &P,
    ) -> Result<T, BackendError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_default();
            return Err(BackendError::Server {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn chat(&self, messages: &[Message]) -> Result<String, BackendError> {
        let payload = ChatPayload {
            messages,
            has_image: messages.iter().any(|m| m.content.has_image()),
        };
        let response: ChatResponse = self.post("/api/chat", &payload).await?;
        Ok(response.content)
    }

    async fn generate_image(&self, prompt: &str) -> Result<GeneratedAsset, BackendError> {
        let response: GenerateImageResponse =
            self.post("/api/generate-image", &ImagePayload { prompt }).await?;
        Ok(GeneratedAsset::new(response.base64))
    }
}
