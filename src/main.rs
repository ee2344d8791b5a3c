//! Palette server
//!
//! Serves the chat and image generation API plus the static presentation layer.

use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use palette_chat::config::Config;
use palette_chat::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palette_chat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Missing credentials are reported per request, but flag them early
    if config.openai_api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; /api/chat will fail");
    }
    if config.novelai_api_key.is_none() {
        tracing::warn!("NOVELAI_API_KEY is not set; /api/generate-image will fail");
    }

    tracing::info!(
        "Chat model: {}, image model: {}",
        config.settings.chat.model,
        config.settings.image.model
    );
    tracing::info!("Serving static files from {}", config.static_dir.display());

    let app = routes::app(AppState::new(config));

    tracing::info!("🎨 Palette running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
