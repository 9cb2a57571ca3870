//! Query modes, requests and result records

use crate::error::{Result, RetrieverError};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Which encoder path and which index a query uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Text2Image,
    Image2Text,
    Text2Text,
    Multimodal2Text,
}

impl QueryType {
    pub const ALL: [QueryType; 4] = [
        QueryType::Text2Image,
        QueryType::Image2Text,
        QueryType::Text2Text,
        QueryType::Multimodal2Text,
    ];
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryType::Text2Image => write!(f, "text2image"),
            QueryType::Image2Text => write!(f, "image2text"),
            QueryType::Text2Text => write!(f, "text2text"),
            QueryType::Multimodal2Text => write!(f, "multimodal2text"),
        }
    }
}

impl std::str::FromStr for QueryType {
    type Err = RetrieverError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text2image" => Ok(QueryType::Text2Image),
            "image2text" => Ok(QueryType::Image2Text),
            "text2text" => Ok(QueryType::Text2Text),
            "multimodal2text" => Ok(QueryType::Multimodal2Text),
            _ => Err(RetrieverError::UnsupportedQueryType {
                query_type: s.to_string(),
            }),
        }
    }
}

/// Untyped `{query_type, text?, image?}` request as submitted by callers
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub query_type: String,
    pub text: Option<String>,
    pub image: Option<DynamicImage>,
    /// Name shown for the image in analysis prompts, usually its file name
    pub image_label: Option<String>,
}

impl QueryRequest {
    pub fn new(query_type: impl Into<String>) -> Self {
        Self {
            query_type: query_type.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_image(mut self, image: DynamicImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_image_label(mut self, label: impl Into<String>) -> Self {
        self.image_label = Some(label.into());
        self
    }

    pub fn text2image(text: impl Into<String>) -> Self {
        Self::new("text2image").with_text(text)
    }

    pub fn text2text(text: impl Into<String>) -> Self {
        Self::new("text2text").with_text(text)
    }

    pub fn image2text(image: DynamicImage) -> Self {
        Self::new("image2text").with_image(image)
    }

    pub fn multimodal2text(image: DynamicImage, text: impl Into<String>) -> Self {
        Self::new("multimodal2text").with_image(image).with_text(text)
    }
}

/// A validated query carrying exactly the inputs its mode needs
#[derive(Debug, Clone)]
pub enum Query {
    Text2Image { text: String },
    Image2Text { image: DynamicImage },
    Text2Text { text: String },
    Multimodal2Text { image: DynamicImage, text: String },
}

impl Query {
    pub fn query_type(&self) -> QueryType {
        match self {
            Query::Text2Image { .. } => QueryType::Text2Image,
            Query::Image2Text { .. } => QueryType::Image2Text,
            Query::Text2Text { .. } => QueryType::Text2Text,
            Query::Multimodal2Text { .. } => QueryType::Multimodal2Text,
        }
    }

    /// Text input, if the mode carries one
    pub fn text(&self) -> Option<&str> {
        match self {
            Query::Text2Image { text }
            | Query::Text2Text { text }
            | Query::Multimodal2Text { text, .. } => Some(text),
            Query::Image2Text { .. } => None,
        }
    }
}

impl TryFrom<QueryRequest> for Query {
    type Error = RetrieverError;

    fn try_from(request: QueryRequest) -> Result<Self> {
        let query_type: QueryType = request.query_type.parse()?;
        let missing = |field: &'static str| RetrieverError::MissingQueryField {
            query_type: query_type.to_string(),
            field,
        };

        Ok(match query_type {
            QueryType::Text2Image => Query::Text2Image {
                text: request.text.ok_or_else(|| missing("text"))?,
            },
            QueryType::Text2Text => Query::Text2Text {
                text: request.text.ok_or_else(|| missing("text"))?,
            },
            QueryType::Image2Text => Query::Image2Text {
                image: request.image.ok_or_else(|| missing("image"))?,
            },
            QueryType::Multimodal2Text => Query::Multimodal2Text {
                image: request.image.ok_or_else(|| missing("image"))?,
                text: request.text.ok_or_else(|| missing("text"))?,
            },
        })
    }
}

/// One ranked hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RetrievalResult {
    Image {
        path: String,
        similarity: f32,
    },
    Text {
        id: String,
        content: String,
        similarity: f32,
    },
}

impl RetrievalResult {
    pub fn similarity(&self) -> f32 {
        match self {
            RetrievalResult::Image { similarity, .. } | RetrievalResult::Text { similarity, .. } => {
                *similarity
            }
        }
    }

    /// Path for image hits, id for text hits
    pub fn identifier(&self) -> &str {
        match self {
            RetrievalResult::Image { path, .. } => path,
            RetrievalResult::Text { id, .. } => id,
        }
    }
}
