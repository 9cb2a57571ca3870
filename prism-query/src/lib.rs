//! # prism-query
//!
//! Turns an image plus a text question into an augmented text query using a
//! vision-language model, treating the model as an unreliable source of
//! structured data.
//!
//! The flow for one query:
//!
//! 1. [`prompt`] renders a fixed-schema instruction
//! 2. a [`Generator`] answers it with free-form text
//! 3. [`repair`] extracts and heals the JSON object in the reply
//! 4. [`schema`] validates it into a [`QueryAnalysis`]
//! 5. [`QueryAnalyzer`] retries schema failures up to `max_attempts` and falls
//!    back to the original query when they run out
//!
//! ```no_run
//! use prism_query::{AnalyzerConfig, QueryAnalyzer, ScriptedGenerator};
//! use std::sync::Arc;
//!
//! # async fn example(image: image::DynamicImage) -> prism_query::Result<()> {
//! let generator = Arc::new(ScriptedGenerator::new(["assistant\n\n{}"])?);
//! let analyzer = QueryAnalyzer::new(generator, AnalyzerConfig::default())?;
//! let (query, result) = analyzer.get_enhanced_query(&image, Some("park.jpg"), "what is it doing?").await;
//! println!("searching for {query} (analysis ok: {})", result.success);
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod error;
pub mod generator;
pub mod prompt;
pub mod repair;
pub mod schema;

pub use analyzer::{AnalyzerConfig, QueryAnalysisResult, QueryAnalyzer};
pub use error::{AnalysisError, Result};
pub use generator::{
    GenerationParams, Generator, HttpGenerator, HttpGeneratorConfig, ScriptedGenerator,
    ScriptedGeneratorConfig,
};
pub use schema::QueryAnalysis;
