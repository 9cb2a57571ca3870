//! Text, image and joint encoders
//!
//! Every encoder returns a unit-length vector. Long text is cut into token
//! windows, each window is embedded and normalized, and the window vectors are
//! mean-pooled and renormalized.

use crate::config::{Combination, EmbedConfig, WindowConfig};
use crate::error::{EmbedError, Result};
use crate::provider::{ImageModel, ModelBackend, TextModel};
use crate::vector::{Embedding, mean, normalized};
use image::DynamicImage;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

/// Token ranges visited by the chunked path for a sequence of `len` tokens.
///
/// Windows start at `0, stride, 2*stride, ...` while the start is inside the
/// sequence and end at `min(start + max_token_length, len)`.
pub fn windows(len: usize, window: WindowConfig) -> Vec<Range<usize>> {
    if window.stride == 0 || window.max_token_length == 0 {
        return Vec::new();
    }
    (0..len)
        .step_by(window.stride)
        .map(|start| start..(start + window.max_token_length).min(len))
        .filter(|range| !range.is_empty())
        .collect()
}

/// Chunked text encoder
#[derive(Clone)]
pub struct TextEncoder {
    model: Arc<dyn TextModel>,
    window: WindowConfig,
}

impl std::fmt::Debug for TextEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextEncoder")
            .field("model", &self.model.provider_name())
            .field("window", &self.window)
            .finish()
    }
}

impl TextEncoder {
    pub fn new(model: Arc<dyn TextModel>, window: WindowConfig) -> Result<Self> {
        window.validate()?;
        Ok(Self { model, window })
    }

    pub fn window(&self) -> WindowConfig {
        self.window
    }

    pub fn dimension(&self) -> usize {
        self.model.embedding_dimension()
    }

    /// Encode with the encoder's own window settings
    pub async fn encode(&self, text: &str) -> Result<Embedding> {
        self.encode_with(text, self.window).await
    }

    /// Encode with explicit window settings.
    ///
    /// A text of at most `max_token_length` tokens takes a single model call.
    /// Longer text is pooled over [`windows`].
    pub async fn encode_with(&self, text: &str, window: WindowConfig) -> Result<Embedding> {
        window.validate()?;
        let tokens = self.model.tokenize(text)?;

        if tokens.len() <= window.max_token_length {
            let vector = self.model.embed_tokens(&tokens).await?;
            return self.finish(vector);
        }

        let ranges = windows(tokens.len(), window);
        tracing::debug!(
            "Encoding {} tokens as {} windows (max {}, stride {})",
            tokens.len(),
            ranges.len(),
            window.max_token_length,
            window.stride
        );

        let mut pooled = Vec::with_capacity(ranges.len());
        for range in ranges {
            let vector = self.model.embed_tokens(&tokens[range]).await?;
            pooled.push(self.finish(vector)?);
        }
        normalized(mean(&pooled)?)
    }

    fn finish(&self, vector: Embedding) -> Result<Embedding> {
        let expected = self.model.embedding_dimension();
        if vector.len() != expected {
            return Err(EmbedError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        normalized(vector)
    }
}

/// Whole-image encoder
#[derive(Clone)]
pub struct ImageEncoder {
    model: Arc<dyn ImageModel>,
}

impl std::fmt::Debug for ImageEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageEncoder")
            .field("model", &self.model.provider_name())
            .finish()
    }
}

impl ImageEncoder {
    pub fn new(model: Arc<dyn ImageModel>) -> Self {
        Self { model }
    }

    pub fn dimension(&self) -> usize {
        self.model.embedding_dimension()
    }

    pub async fn encode(&self, image: &DynamicImage) -> Result<Embedding> {
        let vector = self.model.embed_image(image).await?;
        let expected = self.model.embedding_dimension();
        if vector.len() != expected {
            return Err(EmbedError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        normalized(vector)
    }

    /// Decode an image file off the async runtime, then encode it
    pub async fn encode_path(&self, path: &Path) -> Result<Embedding> {
        let image = load_image(path).await?;
        self.encode(&image).await
    }
}

/// Decode an image file on the blocking pool
pub async fn load_image(path: &Path) -> Result<DynamicImage> {
    let path = path.to_path_buf();
    let image = tokio::task::spawn_blocking(move || image::open(path)).await??;
    Ok(image)
}

/// Fuse two unit vectors into one unit vector
pub fn combine(image: &[f32], text: &[f32], combination: Combination) -> Result<Embedding> {
    if image.len() != text.len() {
        return Err(EmbedError::DimensionMismatch {
            expected: image.len(),
            actual: text.len(),
        });
    }
    if combination != Combination::Average {
        tracing::warn!(
            "Combination strategy '{}' has no projection back to {} dimensions; using 'average'",
            combination,
            image.len()
        );
    }
    let averaged = image
        .iter()
        .zip(text.iter())
        .map(|(a, b)| (a + b) / 2.0)
        .collect();
    normalized(averaged)
}

/// Image plus text encoder
#[derive(Debug, Clone)]
pub struct JointEncoder {
    text: TextEncoder,
    image: ImageEncoder,
    combination: Combination,
}

impl JointEncoder {
    pub fn new(text: TextEncoder, image: ImageEncoder, combination: Combination) -> Result<Self> {
        let expected = text.dimension();
        let actual = image.dimension();
        if expected != actual {
            return Err(EmbedError::DimensionMismatch { expected, actual });
        }
        Ok(Self {
            text,
            image,
            combination,
        })
    }

    /// Build all three encoders over one backend
    pub fn from_backend(backend: &ModelBackend, config: &EmbedConfig) -> Result<Self> {
        let text = TextEncoder::new(backend.text.clone(), config.window)?;
        let image = ImageEncoder::new(backend.image.clone());
        Self::new(text, image, config.combination)
    }

    pub fn text(&self) -> &TextEncoder {
        &self.text
    }

    pub fn image(&self) -> &ImageEncoder {
        &self.image
    }

    pub fn combination(&self) -> Combination {
        self.combination
    }

    pub async fn encode(&self, image: &DynamicImage, text: &str) -> Result<Embedding> {
        self.encode_with(image, text, self.text.window()).await
    }

    pub async fn encode_with(
        &self,
        image: &DynamicImage,
        text: &str,
        window: WindowConfig,
    ) -> Result<Embedding> {
        let image_vector = self.image.encode(image).await?;
        let text_vector = self.text.encode_with(text, window).await?;
        combine(&image_vector, &text_vector, self.combination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::HashingModel;
    use crate::vector::{dot, l2_norm};
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    /// Tokenizes by whitespace and records every window it is asked to embed
    #[derive(Default)]
    struct RecordingModel {
        calls: Mutex<Vec<Vec<u32>>>,
    }

    #[async_trait]
    impl TextModel for RecordingModel {
        fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
            Ok(text
                .split_whitespace()
                .map(|word| word.parse().unwrap_or(0))
                .collect())
        }

        async fn embed_tokens(&self, token_ids: &[u32]) -> Result<Embedding> {
            self.calls.lock().unwrap().push(token_ids.to_vec());
            let first = token_ids.first().copied().unwrap_or(0) as f32;
            Ok(vec![1.0 + first, token_ids.len() as f32, 0.5])
        }

        fn embedding_dimension(&self) -> usize {
            3
        }

        fn provider_name(&self) -> &str {
            "recording"
        }
    }

    fn numbers(n: u32) -> String {
        (0..n).map(|i| i.to_string()).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_windows_overlapping() {
        let ranges = windows(100, WindowConfig::new(77, 64));
        assert_eq!(ranges, vec![0..77, 64..100]);
    }

    #[test]
    fn test_windows_disjoint_when_stride_equals_width() {
        let ranges = windows(10, WindowConfig::new(4, 4));
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
        let covered: usize = ranges.iter().map(|r| r.len()).sum();
        assert_eq!(covered, 10);
    }

    #[test]
    fn test_windows_stride_larger_than_width() {
        let ranges = windows(10, WindowConfig::new(2, 5));
        assert_eq!(ranges, vec![0..2, 5..7]);
        assert!(windows(0, WindowConfig::new(2, 5)).is_empty());
    }

    #[tokio::test]
    async fn test_boundary_length_uses_single_pass() {
        let model = Arc::new(RecordingModel::default());
        let encoder = TextEncoder::new(model.clone(), WindowConfig::new(8, 4)).unwrap();

        let vector = encoder.encode(&numbers(8)).await.unwrap();
        assert!((l2_norm(&vector) - 1.0).abs() < 1e-5);
        assert_eq!(model.calls.lock().unwrap().len(), 1);
        assert_eq!(model.calls.lock().unwrap()[0].len(), 8);
    }

    #[tokio::test]
    async fn test_long_text_is_pooled_over_windows() {
        let model = Arc::new(RecordingModel::default());
        let encoder = TextEncoder::new(model.clone(), WindowConfig::new(8, 4)).unwrap();

        let vector = encoder.encode(&numbers(9)).await.unwrap();
        assert!((l2_norm(&vector) - 1.0).abs() < 1e-5);

        let calls = model.calls.lock().unwrap();
        let lengths: Vec<usize> = calls.iter().map(|c| c.len()).collect();
        assert_eq!(lengths, vec![8, 5, 1]);
        assert_eq!(calls[1][0], 4);
        assert_eq!(calls[2][0], 8);
    }

    #[tokio::test]
    async fn test_pooled_vector_is_mean_of_normalized_windows() {
        let model = Arc::new(RecordingModel::default());
        let encoder = TextEncoder::new(model.clone(), WindowConfig::new(2, 2)).unwrap();

        let vector = encoder.encode("0 1 2 3").await.unwrap();
        let first = normalized(vec![1.0, 2.0, 0.5]).unwrap();
        let second = normalized(vec![3.0, 2.0, 0.5]).unwrap();
        let expected = normalized(mean(&[first, second]).unwrap()).unwrap();
        for (a, b) in vector.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_zero_stride_rejected() {
        let model = Arc::new(RecordingModel::default());
        assert!(TextEncoder::new(model.clone(), WindowConfig::new(8, 0)).is_err());

        let encoder = TextEncoder::new(model, WindowConfig::default()).unwrap();
        let err = encoder
            .encode_with("1 2 3", WindowConfig::new(0, 4))
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_hashing_text_is_unit_norm() {
        let model = Arc::new(HashingModel::new(64).unwrap());
        let encoder = TextEncoder::new(model, WindowConfig::new(6, 3)).unwrap();

        for text in ["", "short", "a much longer sentence that will need several windows"] {
            let vector = encoder.encode(text).await.unwrap();
            assert!((l2_norm(&vector) - 1.0).abs() < 1e-5, "text: {text:?}");
        }
    }

    #[test]
    fn test_combine_average() {
        let a = normalized(vec![1.0, 0.0, 0.0]).unwrap();
        let b = normalized(vec![0.0, 1.0, 0.0]).unwrap();
        let joint = combine(&a, &b, Combination::Average).unwrap();

        let half = 1.0 / 2.0f32.sqrt();
        assert!((joint[0] - half).abs() < 1e-6);
        assert!((joint[1] - half).abs() < 1e-6);
        assert!((l2_norm(&joint) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_combine_rejects_mismatched_widths() {
        assert!(matches!(
            combine(&[1.0, 0.0], &[1.0, 0.0, 0.0], Combination::Average),
            Err(EmbedError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_combine_opposite_vectors_is_zero_norm() {
        assert!(matches!(
            combine(&[1.0, 0.0], &[-1.0, 0.0], Combination::Average),
            Err(EmbedError::ZeroNorm)
        ));
    }

    #[tracing_test::traced_test]
    #[test]
    fn test_concat_falls_back_to_average() {
        let a = vec![0.6, 0.8];
        let b = vec![0.8, 0.6];
        let concat = combine(&a, &b, Combination::Concat).unwrap();
        let average = combine(&a, &b, Combination::Average).unwrap();
        assert_eq!(concat, average);
        assert_eq!(concat.len(), 2);
        assert!(logs_contain("using 'average'"));
    }

    #[tokio::test]
    async fn test_joint_encoder_over_hashing_backend() {
        let backend = crate::backends::hashing_backend(&EmbedConfig::hashing(64)).unwrap();
        let joint = JointEncoder::from_backend(&backend, &EmbedConfig::hashing(64)).unwrap();

        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 30, 30])));
        let fused = joint.encode(&image, "a red square").await.unwrap();
        let image_only = joint.image().encode(&image).await.unwrap();
        let text_only = joint.text().encode("a red square").await.unwrap();

        let expected = combine(&image_only, &text_only, Combination::Average).unwrap();
        assert!((dot(&fused, &expected) - 1.0).abs() < 1e-5);
    }
}
