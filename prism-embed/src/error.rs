//! Error types for the encoding layer

use std::path::PathBuf;

/// Result type for encoding operations.
///
/// Used throughout the crate for operations that can fail.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all encoding operations.
///
/// Covers configuration problems detected before a model is touched, failures
/// raised while loading or running a model backend, and the vector-level
/// conditions the encoders refuse to paper over (a zero vector cannot be
/// normalized, two vectors of different width cannot be combined).
///
/// # Error Categories
///
/// - **Configuration Errors**: invalid window sizes, unknown combination strategy
/// - **Initialization Errors**: failures during model or tokenizer loading
/// - **Runtime Errors**: tokenization, image decoding or embedding generation
/// - **Vector Errors**: zero-norm output, dimension mismatch
/// - **External Errors**: failures from backend libraries
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when a model or tokenizer file is not found
    #[error("Model file not found: {path}")]
    ModelFileNotFound { path: PathBuf },

    /// Error when the encoder configuration is invalid
    #[error("Invalid encoder configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during model initialization
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Tokenizer rejected the input
    #[error("Tokenization failed: {message}")]
    Tokenization { message: String },

    /// An image could not be decoded or re-encoded
    #[error("Image error: {source}")]
    Image {
        #[from]
        source: image::ImageError,
    },

    /// Two vectors that must share a width do not
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A model produced a vector that cannot be normalized
    #[error("Cannot normalize a zero-norm vector")]
    ZeroNorm,

    /// A shared model handle was poisoned by a panicking thread
    #[error("Model lock poisoned: {model}")]
    ModelLockPoisoned { model: String },

    /// IO errors when reading model files
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create a model initialization error from any error type.
    ///
    /// # Arguments
    /// * `source` - The underlying error that caused the initialization failure
    pub fn model_init<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ModelInitialization {
            source: Box::new(source),
        }
    }

    /// Create an embedding generation error from any error type.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::EmbeddingGeneration {
            source: Box::new(source),
        }
    }

    /// Create an invalid configuration error with a custom message.
    ///
    /// # Arguments
    /// * `message` - What is wrong with the configuration
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a tokenization error with a custom message.
    pub fn tokenization<S: Into<String>>(message: S) -> Self {
        Self::Tokenization {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EmbedError::invalid_config("stride must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid encoder configuration: stride must be positive"
        );

        let err = EmbedError::DimensionMismatch {
            expected: 512,
            actual: 384,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 512, got 384");
    }
}
