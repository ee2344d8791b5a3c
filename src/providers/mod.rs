//! Upstream AI provider adapters

pub mod archive;
pub mod novelai;
pub mod openai_compat;

use reqwest::{Response, StatusCode};
use serde_json::Value;
use thiserror::Error;

pub use novelai::NovelAiProvider;
pub use openai_compat::OpenAICompatProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("asset not found in archive")]
    AssetNotFound,

    #[error("Failed to decode image archive: {0}")]
    Decode(String),
}

/// Longest raw upstream body echoed back in an error message
const MAX_ERROR_BODY: usize = 512;

/// Build an `Upstream` error from a non-success response body.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}` and
/// `{"message": ..}`; anything else falls back to the raw (truncated) body.
pub(crate) fn upstream_error(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("error").filter(|e| e.is_string()))
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let body = body.trim();
            if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("empty response")
                    .to_string()
            } else {
                body.chars().take(MAX_ERROR_BODY).collect()
            }
        });

    ProviderError::Upstream {
        status: status.as_u16(),
        message,
    }
}

/// Pass a success response through; turn anything else into `Upstream`.
///
/// An unreadable error body still yields the upstream status, with the
/// canonical reason as message.
pub(crate) async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(upstream_error(status, &body))
}
