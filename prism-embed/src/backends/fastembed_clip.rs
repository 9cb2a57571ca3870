//! CLIP ViT-B/32 through fastembed's ONNX runtime

use crate::config::EmbedConfig;
use crate::downloader::ModelDownloader;
use crate::error::{EmbedError, Result};
use crate::provider::{ImageModel, TextModel};
use crate::vector::Embedding;
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};
use fnv::FnvHasher;
use image::{DynamicImage, ImageFormat};
use std::collections::HashMap;
use std::hash::Hasher;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokenizers::Tokenizer;

/// Cached model entries (text tower, image tower, dimension)
type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, Arc<Mutex<ImageEmbedding>>, usize);

/// Global cache for initialized models to avoid reloading
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn get_model_cache() -> &'static Mutex<HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Width of the sample embedding; an empty reply is an error, not width 0
fn sample_dimension(sample: &[Embedding]) -> Result<usize> {
    match sample.first().map(Vec::len) {
        Some(dimension) if dimension > 0 => Ok(dimension),
        _ => Err(EmbedError::invalid_config("CLIP produced no sample embedding")),
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| EmbedError::ModelLockPoisoned {
        model: what.to_string(),
    })
}

/// CLIP text and vision towers sharing one 512-wide space
#[derive(Clone)]
pub struct FastEmbedClip {
    config: EmbedConfig,
    text_model: Arc<Mutex<TextEmbedding>>,
    image_model: Arc<Mutex<ImageEmbedding>>,
    tokenizer: Arc<Tokenizer>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedClip")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedClip {
    /// Download (if needed) and load both towers plus the tokenizer.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!("Initializing CLIP backend for model: {}", config.model_name);

        let tokenizer = Arc::new(Self::load_tokenizer(&config).await?);
        let cache_key = Self::create_cache_key(&config)?;

        let cached = {
            let cache = lock(get_model_cache(), "model cache")?;
            cache
                .get(&cache_key)
                .map(|(text, image, dim)| (Arc::clone(text), Arc::clone(image), *dim))
        };

        let (text_model, image_model, dimension) = match cached {
            Some(entry) => {
                tracing::info!("Using cached model for: {}", config.model_name);
                entry
            }
            None => {
                let cache_dir = config.cache_dir.clone();
                let (text, image, dimension) = tokio::task::spawn_blocking(
                    move || -> Result<(TextEmbedding, ImageEmbedding, usize)> {
                        let mut text = TextEmbedding::try_new(
                            InitOptions::new(EmbeddingModel::ClipVitB32)
                                .with_cache_dir(cache_dir.clone())
                                .with_show_download_progress(true),
                        )
                        .map_err(|e| EmbedError::External { source: e })?;

                        let image = ImageEmbedding::try_new(
                            ImageInitOptions::new(ImageEmbeddingModel::ClipVitB32)
                                .with_cache_dir(cache_dir)
                                .with_show_download_progress(true),
                        )
                        .map_err(|e| EmbedError::External { source: e })?;

                        // Measure the width instead of trusting the config
                        let sample = text
                            .embed(vec!["test".to_string()], None)
                            .map_err(|e| EmbedError::External { source: e })?;
                        let dimension = sample_dimension(&sample)?;

                        tracing::info!("CLIP model loaded successfully. Dimension: {}", dimension);
                        Ok((text, image, dimension))
                    },
                )
                .await??;

                let entry = (
                    Arc::new(Mutex::new(text)),
                    Arc::new(Mutex::new(image)),
                    dimension,
                );
                let mut cache = lock(get_model_cache(), "model cache")?;
                cache.insert(
                    cache_key,
                    (Arc::clone(&entry.0), Arc::clone(&entry.1), entry.2),
                );
                entry
            }
        };

        if dimension != config.dimension {
            return Err(EmbedError::DimensionMismatch {
                expected: config.dimension,
                actual: dimension,
            });
        }

        Ok(Self {
            config,
            text_model,
            image_model,
            tokenizer,
            dimension,
        })
    }

    async fn load_tokenizer(config: &EmbedConfig) -> Result<Tokenizer> {
        let path = ModelDownloader::new(config)?.ensure_tokenizer(config).await?;
        let mut tokenizer = Tokenizer::from_file(&path).map_err(|source| {
            EmbedError::ModelInitialization { source }
        })?;
        // Windowing needs the full sequence
        tokenizer
            .with_truncation(None)
            .map_err(|source| EmbedError::ModelInitialization { source })?;
        tokenizer.with_padding(None);
        Ok(tokenizer)
    }

    /// Cache key derived from the full configuration
    fn create_cache_key(config: &EmbedConfig) -> Result<String> {
        let config_json = serde_json::to_string(config)
            .map_err(|e| EmbedError::External { source: e.into() })?;

        let mut hasher = FnvHasher::default();
        hasher.write(b"v1:");
        hasher.write(config_json.as_bytes());

        Ok(format!("v1:{:x}", hasher.finish()))
    }

    /// Drop every cached model
    pub fn clear_cache() -> Result<()> {
        lock(get_model_cache(), "model cache")?.clear();
        tracing::info!("Model cache cleared");
        Ok(())
    }

    pub fn cache_size() -> usize {
        lock(get_model_cache(), "model cache")
            .map(|cache| cache.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl TextModel for FastEmbedClip {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedError::tokenization(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    async fn embed_tokens(&self, token_ids: &[u32]) -> Result<Embedding> {
        // fastembed only takes strings, so the window goes back through the tokenizer
        let window_text = self
            .tokenizer
            .decode(token_ids, true)
            .map_err(|e| EmbedError::tokenization(e.to_string()))?;

        let model = Arc::clone(&self.text_model);
        let embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = lock(&model, "clip text")?;
            guard
                .embed(vec![window_text], None)
                .map_err(|e| EmbedError::External { source: e })
        })
        .await??;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for text window"))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed-clip"
    }
}

#[async_trait]
impl ImageModel for FastEmbedClip {
    async fn embed_image(&self, image: &DynamicImage) -> Result<Embedding> {
        let mut png = Cursor::new(Vec::new());
        image.write_to(&mut png, ImageFormat::Png)?;
        let bytes = png.into_inner();

        let model = Arc::clone(&self.image_model);
        let embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = lock(&model, "clip vision")?;
            guard
                .embed_bytes(&[bytes.as_slice()], None)
                .map_err(|e| EmbedError::External { source: e })
        })
        .await??;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for image"))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed-clip"
    }
}
