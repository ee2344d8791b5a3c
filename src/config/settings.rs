//! Operator settings loaded from an optional TOML file
//!
//! Every field has a default, so the file only needs the values being changed:
//!
//! ```toml
//! [chat]
//! model = "gpt-4o"
//!
//! [image]
//! steps = 28
//! sampler = "k_euler_ancestral"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Negative caption sent with every generation request
pub const DEFAULT_NEGATIVE_PROMPT: &str = "lowres, bad anatomy, bad hands, text, error, missing fingers, \
extra digit, fewer digits, cropped, worst quality, low quality, normal quality, jpeg artifacts, \
signature, watermark, username, blurry, artist name";

/// Root settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Chat completion settings
    #[serde(default)]
    pub chat: ChatSettings,

    /// Image generation policy
    #[serde(default)]
    pub image: ImageSettings,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load settings from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.model.trim().is_empty() {
            return Err(ConfigError::Validation("chat.model must not be empty".into()));
        }
        if self.image.width == 0 || self.image.height == 0 {
            return Err(ConfigError::Validation(
                "image.width and image.height must be non-zero".into(),
            ));
        }
        if self.image.steps == 0 {
            return Err(ConfigError::Validation("image.steps must be non-zero".into()));
        }
        Ok(())
    }
}

/// Chat completion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Model identifier sent upstream
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Upstream request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Fixed image generation parameters. None of these come from user input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettings {
    #[serde(default = "default_image_model")]
    pub model: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_sampler")]
    pub sampler: String,

    #[serde(default = "default_steps")]
    pub steps: u32,

    /// Prompt guidance scale
    #[serde(default = "default_scale")]
    pub scale: f32,

    #[serde(default = "default_negative_prompt")]
    pub negative_prompt: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_image_model() -> String {
    "nai-diffusion-4-curated-preview".to_string()
}

fn default_width() -> u32 {
    832
}

fn default_height() -> u32 {
    1216
}

fn default_sampler() -> String {
    "k_euler_ancestral".to_string()
}

fn default_steps() -> u32 {
    28
}

fn default_scale() -> f32 {
    5.0
}

fn default_negative_prompt() -> String {
    DEFAULT_NEGATIVE_PROMPT.to_string()
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            model: default_image_model(),
            width: default_width(),
            height: default_height(),
            sampler: default_sampler(),
            steps: default_steps(),
            scale: default_scale(),
            negative_prompt: default_negative_prompt(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
