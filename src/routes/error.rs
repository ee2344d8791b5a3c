//! Uniform JSON error responses

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::providers::ProviderError;

/// Body of every failed API call
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    InvalidRequest { status: StatusCode, message: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { status, .. } => *status,
            Self::Provider(err) => match err {
                ProviderError::NotConfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ProviderError::RequestFailed(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
                ProviderError::RequestFailed(_) => StatusCode::BAD_GATEWAY,
                ProviderError::Upstream { status, .. } => StatusCode::from_u16(*status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY),
                ProviderError::InvalidResponse(_) | ProviderError::AssetNotFound => {
                    StatusCode::BAD_GATEWAY
                }
                ProviderError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, "{}", self);
        } else {
            tracing::warn!(%status, "{}", self);
        }

        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
