//! Application configuration

pub mod settings;

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use settings::{ChatSettings, ConfigError, ImageSettings, Settings, DEFAULT_NEGATIVE_PROMPT};

/// Largest request body the server accepts (image attachments travel inline as base64)
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_NOVELAI_BASE_URL: &str = "https://image.novelai.net";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a kind and helpful assistant.";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub novelai_api_key: Option<String>,
    pub novelai_base_url: String,
    pub static_dir: PathBuf,
    pub settings: Settings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.into(),
            novelai_api_key: None,
            novelai_base_url: DEFAULT_NOVELAI_BASE_URL.into(),
            static_dir: PathBuf::from("./public"),
            settings: Settings::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut settings = match env::var("PALETTE_CONFIG") {
            Ok(path) => Settings::from_file(&PathBuf::from(path))?,
            Err(_) => Settings::default(),
        };
        if let Some(model) = non_empty_var("CHAT_MODEL") {
            settings.chat.model = model;
        }

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_base_url: non_empty_var("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into()),
            novelai_api_key: non_empty_var("NOVELAI_API_KEY"),
            novelai_base_url: non_empty_var("NOVELAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_NOVELAI_BASE_URL.into()),
            static_dir: env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./public")),
            settings,
        })
    }
}

/// Terminal client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub system_prompt: String,
    pub output_dir: PathBuf,
    /// Record generated images in the conversation history
    pub record_images: bool,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            server_url: non_empty_var("PALETTE_SERVER_URL")
                .unwrap_or_else(|| "http://127.0.0.1:3000".into()),
            system_prompt: non_empty_var("PALETTE_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.into()),
            output_dir: env::var("PALETTE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./generated")),
            record_images: env::var("PALETTE_RECORD_IMAGES")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}

// An exported-but-empty key is treated the same as a missing one
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
