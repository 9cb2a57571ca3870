//! Model capability traits
//!
//! The encoders never talk to a concrete model. They see a [`TextModel`] that can
//! tokenize and embed a token window, and an [`ImageModel`] that can embed one
//! image. Concrete backends live in [`crate::backends`].

use crate::error::{EmbedError, Result};
use crate::vector::Embedding;
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;

/// Text side of an embedding model
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Tokenize the full text without truncation or padding
    fn tokenize(&self, text: &str) -> Result<Vec<u32>>;

    /// Embed one token sequence that fits in the model's context budget.
    ///
    /// The returned vector is not required to be normalized.
    async fn embed_tokens(&self, token_ids: &[u32]) -> Result<Embedding>;

    /// Get the dimension of embeddings produced by this model
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Vision side of an embedding model
#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Embed one whole image. The returned vector is not required to be normalized.
    async fn embed_image(&self, image: &DynamicImage) -> Result<Embedding>;

    /// Get the dimension of embeddings produced by this model
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// A paired text and vision model sharing one embedding space
#[derive(Clone)]
pub struct ModelBackend {
    pub text: Arc<dyn TextModel>,
    pub image: Arc<dyn ImageModel>,
}

impl std::fmt::Debug for ModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBackend")
            .field("text", &self.text.provider_name())
            .field("image", &self.image.provider_name())
            .field("dimension", &self.text.embedding_dimension())
            .finish()
    }
}

impl ModelBackend {
    /// Pair a text and an image model, checking that their widths agree.
    pub fn new(text: Arc<dyn TextModel>, image: Arc<dyn ImageModel>) -> Result<Self> {
        let expected = text.embedding_dimension();
        let actual = image.embedding_dimension();
        if expected != actual {
            return Err(EmbedError::DimensionMismatch { expected, actual });
        }
        Ok(Self { text, image })
    }

    /// Use one object for both towers
    pub fn from_shared<M>(model: Arc<M>) -> Self
    where
        M: TextModel + ImageModel + 'static,
    {
        Self {
            text: model.clone(),
            image: model,
        }
    }

    /// Width of the shared embedding space
    pub fn dimension(&self) -> usize {
        self.text.embedding_dimension()
    }

    pub fn provider_name(&self) -> &str {
        self.text.provider_name()
    }
}
