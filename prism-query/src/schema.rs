//! The structured analysis a generator must produce

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const REQUIRED_KEYS: [&str; 4] = [
    "original_query",
    "explicit_keywords",
    "implicit_keywords",
    "augmented_query",
];

/// A validated query analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub original_query: String,
    pub explicit_keywords: Vec<String>,
    /// Keywords grounded in the image; never empty
    pub implicit_keywords: Vec<String>,
    pub augmented_query: String,
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn string_field(object: &Map<String, Value>, key: &'static str) -> Result<String> {
    match &object[key] {
        Value::String(s) => Ok(s.clone()),
        other => Err(AnalysisError::WrongType {
            key,
            expected: "a string",
            found: kind_of(other),
        }),
    }
}

fn keyword_field(object: &Map<String, Value>, key: &'static str) -> Result<Vec<String>> {
    let items = match &object[key] {
        Value::Array(items) => items,
        other => {
            return Err(AnalysisError::WrongType {
                key,
                expected: "an array",
                found: kind_of(other),
            });
        }
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(AnalysisError::WrongType {
                key,
                expected: "an array of strings",
                found: kind_of(other),
            }),
        })
        .collect()
}

impl QueryAnalysis {
    /// Parse repaired JSON text and enforce the schema.
    ///
    /// Checks run in a fixed order: parse, presence of every required key,
    /// `implicit_keywords` shape and emptiness, then the remaining field types.
    pub fn validate(processed: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(processed)
            .map_err(|source| AnalysisError::InvalidJson { source })?;
        let object = match &value {
            Value::Object(object) => object,
            other => {
                return Err(AnalysisError::WrongType {
                    key: "analysis",
                    expected: "an object",
                    found: kind_of(other),
                });
            }
        };

        for key in REQUIRED_KEYS {
            if !object.contains_key(key) {
                return Err(AnalysisError::MissingKey { key });
            }
        }

        let implicit_keywords = keyword_field(object, "implicit_keywords")?;
        if implicit_keywords.is_empty() {
            return Err(AnalysisError::EmptyKeywords {
                key: "implicit_keywords",
            });
        }

        Ok(Self {
            original_query: string_field(object, "original_query")?,
            explicit_keywords: keyword_field(object, "explicit_keywords")?,
            implicit_keywords,
            augmented_query: string_field(object, "augmented_query")?,
        })
    }
}
