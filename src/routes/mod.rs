//! API routes
//!
//! Both endpoints are stateless: the chat endpoint receives the whole
//! conversation on every call and nothing is kept between requests.

mod error;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::{Config, MAX_BODY_BYTES};
use crate::conversation::Message;
use crate::providers::{NovelAiProvider, OpenAICompatProvider};

pub use error::{ApiError, ErrorBody};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub http: Client,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default, rename = "hasImage")]
    pub has_image: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateImageRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateImageResponse {
    pub base64: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;

    if request.messages.is_empty() {
        return Err(ApiError::bad_request("messages must not be empty"));
    }

    let provider = OpenAICompatProvider::from_config(&state.config, state.http.clone())?;

    let has_image = request
        .has_image
        .unwrap_or_else(|| request.messages.iter().any(|m| m.content.has_image()));
    tracing::info!(
        messages = request.messages.len(),
        has_image,
        "Forwarding chat request"
    );

    let content = provider.chat(&request.messages).await?;

    Ok(Json(ChatResponse { content }))
}

async fn generate_image(
    State(state): State<AppState>,
    payload: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> Result<Json<GenerateImageResponse>, ApiError> {
    let Json(request) = payload?;

    let provider = NovelAiProvider::from_config(&state.config, state.http.clone())?;

    tracing::info!(prompt_len = request.prompt.len(), "Forwarding image generation request");

    let base64 = provider.generate(&request.prompt).await?;

    Ok(Json(GenerateImageResponse { base64 }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/generate-image", post(generate_image))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

/// Full application: API routes, static presentation layer and middleware
pub fn app(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        .merge(router())
        .fallback_service(static_files)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
