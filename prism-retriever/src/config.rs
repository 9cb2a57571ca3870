//! Pipeline configuration loaded from TOML
//!
//! ```toml
//! [model]
//! type = "fastembed_clip"
//! params = { cache_dir = "models" }
//!
//! [encoder]
//! type = "joint"
//! params = { max_token_length = 77, stride = 64 }
//!
//! [indexer]
//! type = "lsh"
//! params = { dim = 512, nbits = 512, use_gpu = false }
//!
//! [retriever]
//! top_k = 3
//!
//! [data]
//! image_folder = "data/images"
//! text_jsonl = "data/texts.jsonl"
//! cache_dir = "cache"
//! ```

use crate::error::{Result, RetrieverError};
use prism_embed::{Combination, WindowConfig};
use prism_query::AnalyzerConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

fn empty_params() -> Value {
    Value::Object(serde_json::Map::new())
}

/// `{type, params}` selection of a registered component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(rename = "type")]
    pub name: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

impl ComponentConfig {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, empty_params())
    }
}

/// Selectable encoder implementations
pub const ENCODER_TYPES: [&str; 1] = ["joint"];

/// Selectable retriever implementations
pub const RETRIEVER_TYPES: [&str; 1] = ["standard"];

/// Token window and fusion settings for the encoders.
///
/// Accepts the settings directly under `[encoder]` or as a
/// `{ type = "joint", params = { ... } }` selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEncoderSection")]
pub struct EncoderSection {
    pub max_token_length: usize,
    pub stride: usize,
    pub combination: Combination,
}

fn default_max_token_length() -> usize {
    prism_embed::config::DEFAULT_MAX_TOKEN_LENGTH
}

fn default_stride() -> usize {
    prism_embed::config::DEFAULT_STRIDE
}

impl Default for EncoderSection {
    fn default() -> Self {
        Self {
            max_token_length: default_max_token_length(),
            stride: default_stride(),
            combination: Combination::default(),
        }
    }
}

impl EncoderSection {
    pub fn window(&self) -> WindowConfig {
        WindowConfig::new(self.max_token_length, self.stride)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EncoderParams {
    #[serde(default = "default_max_token_length")]
    max_token_length: usize,
    #[serde(default = "default_stride")]
    stride: usize,
    #[serde(default)]
    combination: Combination,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEncoderSection {
    #[serde(rename = "type")]
    name: Option<String>,
    params: Option<EncoderParams>,
    max_token_length: Option<usize>,
    stride: Option<usize>,
    combination: Option<Combination>,
}

fn check_selection(section: &str, name: Option<&str>, known: &[&str]) -> std::result::Result<(), String> {
    match name {
        Some(name) if !known.contains(&name) => Err(format!(
            "unknown {section} type '{name}'. Available: {}",
            known.join(", ")
        )),
        _ => Ok(()),
    }
}

impl TryFrom<RawEncoderSection> for EncoderSection {
    type Error = String;

    fn try_from(raw: RawEncoderSection) -> std::result::Result<Self, Self::Error> {
        check_selection("encoder", raw.name.as_deref(), &ENCODER_TYPES)?;
        let inline = raw.max_token_length.is_some() || raw.stride.is_some() || raw.combination.is_some();
        match raw.params {
            Some(_) if inline => Err(
                "encoder settings must be given either inline or under `params`, not both".to_string(),
            ),
            Some(params) => Ok(Self {
                max_token_length: params.max_token_length,
                stride: params.stride,
                combination: params.combination,
            }),
            None => Ok(Self {
                max_token_length: raw.max_token_length.unwrap_or_else(default_max_token_length),
                stride: raw.stride.unwrap_or_else(default_stride),
                combination: raw.combination.unwrap_or_default(),
            }),
        }
    }
}

/// Result count of the retriever.
///
/// Accepts `top_k` directly under `[retriever]` or as a
/// `{ type = "standard", params = { top_k = ... } }` selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRetrieverSection")]
pub struct RetrieverSection {
    pub top_k: usize,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RetrieverParams {
    top_k: usize,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRetrieverSection {
    #[serde(rename = "type")]
    name: Option<String>,
    params: Option<RetrieverParams>,
    top_k: Option<usize>,
}

impl TryFrom<RawRetrieverSection> for RetrieverSection {
    type Error = String;

    fn try_from(raw: RawRetrieverSection) -> std::result::Result<Self, Self::Error> {
        check_selection("retriever", raw.name.as_deref(), &RETRIEVER_TYPES)?;
        match (raw.params, raw.top_k) {
            (Some(_), Some(_)) => Err(
                "retriever top_k must be given either inline or under `params`, not both".to_string(),
            ),
            (Some(params), None) => Ok(Self { top_k: params.top_k }),
            (None, Some(top_k)) => Ok(Self { top_k }),
            (None, None) => Err("missing field `top_k` in retriever section".to_string()),
        }
    }
}

/// How a cached corpus is judged current
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheValidation {
    /// The three cache files exist
    #[default]
    Path,
    /// The stored fingerprint matches the corpus files and encoder settings
    ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSection {
    pub image_folder: PathBuf,
    pub text_jsonl: PathBuf,
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub cache_validation: CacheValidation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalyzerSection {
    pub generator: ComponentConfig,
    #[serde(flatten)]
    pub analyzer: AnalyzerConfig,
}

/// Complete configuration of a retrieval or query-analysis pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub model: ComponentConfig,
    #[serde(default)]
    pub encoder: EncoderSection,
    pub indexer: ComponentConfig,
    pub retriever: RetrieverSection,
    pub data: DataSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_analyzer: Option<QueryAnalyzerSection>,
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| RetrieverError::config(format!("invalid pipeline config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RetrieverError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RetrieverError::config(e.to_string()))
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.retriever.top_k = top_k;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.encoder
            .window()
            .validate()
            .map_err(|e| RetrieverError::config(e.to_string()))?;
        if self.retriever.top_k == 0 {
            return Err(RetrieverError::config("retriever.top_k must be at least 1"));
        }
        if let Some(section) = &self.query_analyzer {
            section
                .analyzer
                .validate()
                .map_err(|e| RetrieverError::config(e.to_string()))?;
        }
        Ok(())
    }
}
