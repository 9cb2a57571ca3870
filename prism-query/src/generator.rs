//! Generative model backends used by the query analyzer

use crate::error::{AnalysisError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Marker the analyzer looks for in front of the JSON reply
pub const ASSISTANT_MARKER: &str = "assistant\n\n";

/// Sampling settings forwarded to the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_new_tokens: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_new_tokens: 1024,
        }
    }
}

/// A vision-language model that answers a prompt about one image
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        image: &DynamicImage,
        params: &GenerationParams,
    ) -> Result<String>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpGeneratorConfig {
    /// Full URL of the generate endpoint
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    temperature: f32,
    max_tokens: usize,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(alias = "text", alias = "content")]
    response: String,
}

/// Calls a remote vision-language model over HTTP
pub struct HttpGenerator {
    client: Client,
    config: HttpGeneratorConfig,
}

impl HttpGenerator {
    pub fn new(config: HttpGeneratorConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(AnalysisError::invalid_config("endpoint must not be empty"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(AnalysisError::generation)?;
        Ok(Self { client, config })
    }

    fn encode_image(image: &DynamicImage) -> Result<String> {
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .map_err(AnalysisError::generation)?;
        Ok(STANDARD.encode(png.into_inner()))
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(
        &self,
        prompt: &str,
        image: &DynamicImage,
        params: &GenerationParams,
    ) -> Result<String> {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            images: vec![Self::encode_image(image)?],
            temperature: params.temperature,
            max_tokens: params.max_new_tokens,
            stream: false,
        };

        tracing::debug!(
            "Requesting analysis from {} ({})",
            self.config.endpoint,
            self.config.model
        );

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let reply: GenerateResponse = request
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(AnalysisError::generation)?
            .json()
            .await
            .map_err(AnalysisError::generation)?;

        Ok(format!("{ASSISTANT_MARKER}{}", reply.response))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Replays canned replies in order, repeating the last one.
///
/// Records every prompt it receives.
pub struct ScriptedGenerator {
    replies: Vec<String>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedGeneratorConfig {
    pub replies: Vec<String>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let replies: Vec<String> = replies.into_iter().map(Into::into).collect();
        if replies.is_empty() {
            return Err(AnalysisError::invalid_config(
                "scripted generator needs at least one reply",
            ));
        }
        Ok(Self {
            replies,
            calls: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _image: &DynamicImage,
        _params: &GenerationParams,
    ) -> Result<String> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| AnalysisError::invalid_config("scripted generator lock poisoned"))?;
        let index = calls.len().min(self.replies.len() - 1);
        calls.push(prompt.to_string());
        Ok(self.replies[index].clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
