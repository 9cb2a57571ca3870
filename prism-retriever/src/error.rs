//! Error type for pipeline construction and retrieval

use crate::registry::ComponentKind;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RetrieverError>;

#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// Unknown component name for a kind
    #[error("No {kind} component named '{name}'. Available: {}", available.join(", "))]
    ComponentNotFound {
        kind: ComponentKind,
        name: String,
        available: Vec<String>,
    },

    /// A registered constructor failed
    #[error("Failed to construct {kind} component '{name}': {source}")]
    ComponentConstruction {
        kind: ComponentKind,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Corpus inputs are missing or malformed
    #[error("Data error: {message}")]
    Data { message: String },

    #[error("Corpus is empty: {message}")]
    EmptyCorpus { message: String },

    #[error("Unsupported query type: '{query_type}'. Valid values are: text2image, image2text, text2text, multimodal2text")]
    UnsupportedQueryType { query_type: String },

    #[error("Query type {query_type} requires field '{field}'")]
    MissingQueryField {
        query_type: String,
        field: &'static str,
    },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    /// Cache files exist but cannot be used
    #[error("Feature cache error at {}: {message}", path.display())]
    Cache { path: PathBuf, message: String },

    #[error(transparent)]
    Embed(#[from] prism_embed::EmbedError),

    #[error(transparent)]
    Analysis(#[from] prism_query::AnalysisError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("Async task failed: {0}")]
    AsyncTask(#[from] tokio::task::JoinError),
}

impl RetrieverError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn data<S: Into<String>>(message: S) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    pub fn cache<S: Into<String>>(path: impl Into<PathBuf>, message: S) -> Self {
        Self::Cache {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_not_found_lists_alternatives() {
        let err = RetrieverError::ComponentNotFound {
            kind: ComponentKind::Indexer,
            name: "ivf".to_string(),
            available: vec!["flat".to_string(), "lsh".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "No indexer component named 'ivf'. Available: flat, lsh"
        );
    }

    #[test]
    fn test_unsupported_query_type_message() {
        let err = RetrieverError::UnsupportedQueryType {
            query_type: "bogus".to_string(),
        };
        assert!(err.to_string().contains("'bogus'"));
    }
}
