//! Configuration for encoders and model backends

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default token budget of a CLIP-style text tower.
pub const DEFAULT_MAX_TOKEN_LENGTH: usize = 77;

/// Default step between consecutive token windows.
pub const DEFAULT_STRIDE: usize = 64;

/// Default embedding width.
pub const DEFAULT_DIMENSION: usize = 512;

/// How the joint encoder fuses an image vector with a text vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combination {
    /// Element-wise mean of the two unit vectors, renormalized
    #[default]
    Average,
    /// Concatenation. No projection back to the model width exists, so the
    /// joint encoder falls back to `Average` and says so in the log.
    Concat,
}

impl std::fmt::Display for Combination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Combination::Average => write!(f, "average"),
            Combination::Concat => write!(f, "concat"),
        }
    }
}

impl std::str::FromStr for Combination {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "average" | "avg" | "mean" => Ok(Combination::Average),
            "concat" | "concatenate" => Ok(Combination::Concat),
            _ => Err(format!(
                "Invalid combination strategy: '{s}'. Valid values are: average, concat"
            )),
        }
    }
}

/// Token window settings used by the chunked text encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Model context budget in tokens
    pub max_token_length: usize,
    /// Step between window starts
    pub stride: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_token_length: DEFAULT_MAX_TOKEN_LENGTH,
            stride: DEFAULT_STRIDE,
        }
    }
}

impl WindowConfig {
    pub fn new(max_token_length: usize, stride: usize) -> Self {
        Self {
            max_token_length,
            stride,
        }
    }

    /// Reject settings the window loop cannot make progress with.
    pub fn validate(&self) -> Result<()> {
        if self.max_token_length == 0 {
            return Err(EmbedError::invalid_config(
                "max_token_length must be greater than zero",
            ));
        }
        if self.stride == 0 {
            return Err(EmbedError::invalid_config("stride must be greater than zero"));
        }
        Ok(())
    }
}

/// Configuration for a model backend and the encoders built on it
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct EmbedConfig {
    /// Name of the model to load (e.g. "clip-ViT-B-32")
    pub model_name: String,
    /// Directory where downloaded model files are cached
    #[builder(default = r#"PathBuf::from("models")"#)]
    pub cache_dir: PathBuf,
    /// HuggingFace repository holding the text tokenizer
    #[builder(default)]
    pub tokenizer_repo: Option<String>,
    /// HuggingFace revision/branch of the tokenizer repository
    #[builder(default = r#"Some("main".to_string())"#)]
    pub tokenizer_revision: Option<String>,
    /// Expected embedding width
    #[builder(default = "DEFAULT_DIMENSION")]
    pub dimension: usize,
    /// Token window settings for long text
    #[builder(default)]
    pub window: WindowConfig,
    /// Image/text fusion strategy
    #[builder(default)]
    pub combination: Combination,
}

impl EmbedConfig {
    /// Create a new configuration using the builder
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Create a configuration for a named model with default settings
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            cache_dir: PathBuf::from("models"),
            tokenizer_repo: None,
            tokenizer_revision: Some("main".to_string()),
            dimension: DEFAULT_DIMENSION,
            window: WindowConfig::default(),
            combination: Combination::default(),
        }
    }

    /// CLIP ViT-B/32 through fastembed, tokenizer from the Qdrant export
    pub fn clip_vit_b32<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            tokenizer_repo: Some("Qdrant/clip-ViT-B-32-text".to_string()),
            ..Self::new("clip-ViT-B-32")
        }
    }

    /// Offline feature-hashing model of the given width
    pub fn hashing(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::new("hashing")
        }
    }

    /// Set the token window (builder style)
    pub fn with_window(self, max_token_length: usize, stride: usize) -> Self {
        Self {
            window: WindowConfig::new(max_token_length, stride),
            ..self
        }
    }

    /// Set the combination strategy (builder style)
    pub fn with_combination(self, combination: Combination) -> Self {
        Self {
            combination,
            ..self
        }
    }

    /// Set the model cache directory (builder style)
    pub fn with_cache_dir<P: AsRef<Path>>(self, cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            ..self
        }
    }

    /// Get the full path to the model directory
    pub fn model_path(&self) -> PathBuf {
        self.cache_dir.join(&self.model_name)
    }

    /// Get the HuggingFace tokenizer repository
    pub fn tokenizer_repo(&self) -> Option<&str> {
        self.tokenizer_repo.as_deref()
    }

    /// Get the HuggingFace revision
    pub fn tokenizer_revision(&self) -> &str {
        self.tokenizer_revision.as_deref().unwrap_or("main")
    }

    /// Validate the configuration before any model is loaded
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model_name must not be empty"));
        }
        if self.dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be greater than zero"));
        }
        self.window.validate()?;
        tracing::debug!("Encoder configuration valid for: {}", self.model_name);
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self::clip_vit_b32("models")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_creation() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::clip_vit_b32(temp_dir.path());

        assert_eq!(config.model_name, "clip-ViT-B-32");
        assert_eq!(config.tokenizer_repo(), Some("Qdrant/clip-ViT-B-32-text"));
        assert_eq!(config.tokenizer_revision(), "main");
        assert_eq!(config.window, WindowConfig::new(77, 64));
        assert_eq!(config.combination, Combination::Average);
        assert_eq!(config.model_path(), temp_dir.path().join("clip-ViT-B-32"));
    }

    #[test]
    fn test_config_builder_methods() {
        let config = EmbedConfig::hashing(64)
            .with_window(16, 8)
            .with_combination(Combination::Concat);

        assert_eq!(config.dimension, 64);
        assert_eq!(config.window.max_token_length, 16);
        assert_eq!(config.window.stride, 8);
        assert_eq!(config.combination, Combination::Concat);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derive_builder_pattern() {
        let config = EmbedConfig::builder()
            .model_name("custom-model")
            .dimension(128usize)
            .build()
            .unwrap();

        assert_eq!(config.model_name, "custom-model");
        assert_eq!(config.dimension, 128);
        assert_eq!(config.cache_dir, PathBuf::from("models"));
        assert_eq!(config.window, WindowConfig::default());
        assert_eq!(config.tokenizer_revision, Some("main".to_string()));
    }

    #[test]
    fn test_validate_rejects_zero_stride() {
        let config = EmbedConfig::hashing(32).with_window(16, 0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stride"));

        let config = EmbedConfig::hashing(32).with_window(0, 4);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_combination_from_str() {
        assert_eq!("average".parse::<Combination>().unwrap(), Combination::Average);
        assert_eq!("MEAN".parse::<Combination>().unwrap(), Combination::Average);
        assert_eq!("concat".parse::<Combination>().unwrap(), Combination::Concat);
        assert!("sum".parse::<Combination>().is_err());
        assert_eq!(Combination::Concat.to_string(), "concat");
    }
}
