//! prism-retriever: cross-modal retrieval over a precomputed image and text corpus
//!
//! Wires the encoders from `prism-embed` and the query analyzer from
//! `prism-query` into pipelines that answer text, image and combined queries
//! against two vector indices.
//!
//! ## Key Modules
//!
//! - **[`index`]**: LSH and exact vector indices behind the [`index::VectorIndex`] trait
//! - **[`registry`]**: `(kind, name)` to constructor mapping used to build components from config
//! - **[`retrieval`]**: corpus preprocessing, the retrieval and query-analysis pipelines
//! - **[`storage`]**: on-disk feature cache
//! - **[`config`]**: TOML pipeline configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use prism_retriever::config::PipelineConfig;
//! use prism_retriever::retrieval::{PipelineKind, QueryRequest, build_pipeline};
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::load(Path::new("pipeline.toml"))?;
//! let pipeline = build_pipeline(PipelineKind::Retrieval, config).await?;
//! let response = pipeline.run(QueryRequest::text2image("a dog on a beach")).await?;
//! for hit in response.results() {
//!     println!("{} {:.3}", hit.identifier(), hit.similarity());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! config → registry → model + indexer
//!                        ↓
//! images/texts → encoders → feature cache → image index / text index
//!                                              ↓
//! QueryRequest → (query analyzer) → encoder → search → RetrievalResult
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod registry;
pub mod retrieval;
pub mod storage;

pub use config::PipelineConfig;
pub use error::{Result, RetrieverError};
pub use registry::{ComponentKind, ComponentRegistry, Constructor};
