//! NovelAI image generation provider
//!
//! Turns a single text prompt into a generation request and unwraps the
//! zip archive the API answers with.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::config::{Config, ImageSettings};

use super::{archive, check_status, ProviderError};

#[derive(Debug, Serialize)]
struct GenerateImageRequest<'a> {
    input: &'a str,
    model: &'a str,
    action: &'static str,
    parameters: GenerationParameters<'a>,
}

#[derive(Debug, Serialize)]
struct GenerationParameters<'a> {
    params_version: u8,
    width: u32,
    height: u32,
    scale: f32,
    sampler: &'a str,
    steps: u32,
    n_samples: u32,
    #[serde(rename = "ucPreset")]
    uc_preset: u8,
    #[serde(rename = "qualityToggle")]
    quality_toggle: bool,
    noise_schedule: &'static str,
    negative_prompt: &'a str,
    v4_prompt: V4Prompt<'a>,
    v4_negative_prompt: V4Prompt<'a>,
}

#[derive(Debug, Serialize)]
struct V4Prompt<'a> {
    caption: Caption<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_coords: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_order: Option<bool>,
}

#[derive(Debug, Serialize)]
struct Caption<'a> {
    base_caption: &'a str,
    char_captions: &'static [&'static str],
}

pub struct NovelAiProvider {
    api_key: String,
    base_url: String,
    settings: ImageSettings,
    client: Client,
}

impl NovelAiProvider {
    /// Build from server configuration; fails when no API key is configured
    pub fn from_config(config: &Config, client: Client) -> Result<Self, ProviderError> {
        let api_key = config
            .novelai_api_key
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("NOVELAI_API_KEY is not set".into()))?;

        Ok(Self {
            api_key,
            base_url: config.novelai_base_url.trim_end_matches('/').to_string(),
            settings: config.settings.image.clone(),
            client,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str) -> GenerateImageRequest<'a> {
        let negative = self.settings.negative_prompt.as_str();

        GenerateImageRequest {
            input: prompt,
            model: &self.settings.model,
            action: "generate",
            parameters: GenerationParameters {
                params_version: 3,
                width: self.settings.width,
                height: self.settings.height,
                scale: self.settings.scale,
                sampler: &self.settings.sampler,
                steps: self.settings.steps,
                n_samples: 1,
                uc_preset: 0,
                quality_toggle: true,
                noise_schedule: "karras",
                negative_prompt: negative,
                v4_prompt: V4Prompt {
                    caption: Caption {
                        base_caption: prompt,
                        char_captions: &[],
                    },
                    use_coords: Some(false),
                    use_order: Some(true),
                },
                v4_negative_prompt: V4Prompt {
                    caption: Caption {
                        base_caption: negative,
                        char_captions: &[],
                    },
                    use_coords: None,
                    use_order: None,
                },
            },
        }
    }

    /// Generate one image and return it as base64-encoded PNG
    pub async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/ai/generate-image", self.base_url);

        tracing::debug!("Requesting image generation from {} ({})", url, self.settings.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .json(&self.request(prompt))
            .send()
            .await?;

        let bytes = check_status(response).await?.bytes().await?;
        tracing::debug!("Received {} byte archive", bytes.len());

        archive::extract_first_png(bytes.to_vec()).await
    }
}
