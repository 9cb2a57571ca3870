//! Error types for query analysis

/// Result type for query analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Everything that can go wrong while turning a generator reply into a
/// validated analysis.
///
/// The schema family (`JsonNotFound` through `EmptyKeywords`) describes a
/// reply that was produced but is unusable; another attempt may fix it.
/// `Generation` means the model call itself failed and is not retried.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// No `{...}` object after an "assistant"/"answer" marker
    #[error("No JSON object found after an assistant/answer marker")]
    JsonNotFound,

    /// The repaired candidate still does not parse
    #[error("Invalid JSON after repair: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing required key: {key}")]
    MissingKey { key: &'static str },

    #[error("{key} must be {expected}, got {found}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{key} array is empty (minimum 1 item required)")]
    EmptyKeywords { key: &'static str },

    /// The generator failed for a reason unrelated to the reply's shape
    #[error("Generation failed: {source}")]
    Generation {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Analyzer or generator settings are unusable
    #[error("Invalid analyzer configuration: {message}")]
    InvalidConfig { message: String },
}

impl AnalysisError {
    /// Whether another generate-and-validate attempt might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::JsonNotFound
                | AnalysisError::InvalidJson { .. }
                | AnalysisError::MissingKey { .. }
                | AnalysisError::WrongType { .. }
                | AnalysisError::EmptyKeywords { .. }
        )
    }

    pub fn generation<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Generation {
            source: Box::new(source),
        }
    }

    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for AnalysisError {
    fn from(err: anyhow::Error) -> Self {
        Self::Generation { source: err.into() }
    }
}
