//! Deterministic feature-hashing model
//!
//! Needs no weights and no network. Words and punctuation become hashed token
//! ids and each id is spread over a few signed buckets of the output vector.
//! Images are reduced to a small thumbnail whose quantized pixels are hashed
//! the same way. The result is a stable embedding space that is good enough to
//! rank near-duplicates and to exercise the whole retrieval stack offline.

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{ImageModel, TextModel};
use crate::vector::Embedding;
use async_trait::async_trait;
use fnv::FnvHasher;
use image::DynamicImage;
use image::imageops::FilterType;
use regex::Regex;
use std::hash::Hasher;
use std::sync::LazyLock;

/// Start-of-text marker, added to every token sequence
pub const BOS_TOKEN: u32 = 1;
/// End-of-text marker, added to every token sequence
pub const EOS_TOKEN: u32 = 2;
const RESERVED_TOKENS: u32 = 3;
const DEFAULT_VOCAB_SIZE: u32 = 1 << 20;
const BUCKETS_PER_FEATURE: u64 = 4;
const THUMBNAIL_SIDE: u32 = 8;
const COLOR_LEVELS: u8 = 4;

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+|[^\w\s]").expect("token pattern is valid"));

/// Offline embedding model built from feature hashing
#[derive(Debug, Clone)]
pub struct HashingModel {
    dimension: usize,
    vocab_size: u32,
}

impl HashingModel {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config(
                "hashing model dimension must be greater than zero",
            ));
        }
        Ok(Self {
            dimension,
            vocab_size: DEFAULT_VOCAB_SIZE,
        })
    }

    pub fn from_config(config: &EmbedConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.dimension)
    }

    fn token_id(&self, piece: &str) -> u32 {
        let mut hasher = FnvHasher::default();
        hasher.write(piece.as_bytes());
        let span = u64::from(self.vocab_size - RESERVED_TOKENS);
        RESERVED_TOKENS + (hasher.finish() % span) as u32
    }

    /// Add one hashed feature to the vector
    fn scatter(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        for salt in 0..BUCKETS_PER_FEATURE {
            let mut hasher = FnvHasher::default();
            hasher.write_u64(salt);
            hasher.write(feature);
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign * weight;
        }
    }
}

#[async_trait]
impl TextModel for HashingModel {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let lowered = text.to_lowercase();
        let mut ids = vec![BOS_TOKEN];
        ids.extend(
            TOKEN_PATTERN
                .find_iter(&lowered)
                .map(|piece| self.token_id(piece.as_str())),
        );
        ids.push(EOS_TOKEN);
        Ok(ids)
    }

    async fn embed_tokens(&self, token_ids: &[u32]) -> Result<Embedding> {
        let mut vector = vec![0.0f32; self.dimension];
        for id in token_ids {
            self.scatter(&mut vector, &id.to_le_bytes(), 1.0);
        }
        Ok(vector)
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }
}

#[async_trait]
impl ImageModel for HashingModel {
    async fn embed_image(&self, image: &DynamicImage) -> Result<Embedding> {
        let thumbnail = image
            .resize_exact(THUMBNAIL_SIDE, THUMBNAIL_SIDE, FilterType::Triangle)
            .to_rgb8();
        let step = 256 / u16::from(COLOR_LEVELS);

        let mut vector = vec![0.0f32; self.dimension];
        for (x, y, pixel) in thumbnail.enumerate_pixels() {
            for (channel, value) in pixel.0.iter().enumerate() {
                let level = (u16::from(*value) / step) as u8;
                // Position-free colour feature plus a positional one
                self.scatter(&mut vector, &[b'c', channel as u8, level], 1.0);
                self.scatter(
                    &mut vector,
                    &[b'p', x as u8, y as u8, channel as u8, level],
                    0.5,
                );
            }
        }
        Ok(vector)
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{dot, normalized};
    use image::{Rgb, RgbImage};

    fn solid(color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb(color)))
    }

    #[test]
    fn test_tokenize_adds_markers() {
        let model = HashingModel::new(32).unwrap();
        let ids = model.tokenize("A red car.").unwrap();
        assert_eq!(ids.len(), 5);
        assert_eq!(ids.first(), Some(&BOS_TOKEN));
        assert_eq!(ids.last(), Some(&EOS_TOKEN));
        assert!(ids[1..4].iter().all(|id| *id >= RESERVED_TOKENS));

        assert_eq!(model.tokenize("").unwrap(), vec![BOS_TOKEN, EOS_TOKEN]);
    }

    #[test]
    fn test_tokenize_is_case_insensitive() {
        let model = HashingModel::new(32).unwrap();
        assert_eq!(
            model.tokenize("Red CAR").unwrap(),
            model.tokenize("red car").unwrap()
        );
    }

    #[tokio::test]
    async fn test_text_embedding_is_deterministic() {
        let model = HashingModel::new(64).unwrap();
        let ids = model.tokenize("a photo of a dog").unwrap();
        let a = model.embed_tokens(&ids).await.unwrap();
        let b = model.embed_tokens(&ids).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.iter().any(|v| *v != 0.0));
    }

    #[tokio::test]
    async fn test_similar_images_score_higher() {
        let model = HashingModel::new(128).unwrap();
        let red = normalized(model.embed_image(&solid([250, 10, 10])).await.unwrap()).unwrap();
        let red2 = normalized(model.embed_image(&solid([240, 20, 5])).await.unwrap()).unwrap();
        let blue = normalized(model.embed_image(&solid([10, 10, 250])).await.unwrap()).unwrap();

        assert!(dot(&red, &red2) > dot(&red, &blue));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingModel::new(0).is_err());
    }
}
