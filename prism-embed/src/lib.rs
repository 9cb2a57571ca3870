//! # prism-embed
//!
//! Encoders that map text, images, or both into one shared unit-length
//! embedding space, on top of pluggable local model backends.
//!
//! ## Features
//!
//! - **Chunked Text Encoding**: text longer than the model context is cut into
//!   overlapping token windows and mean-pooled instead of truncated
//! - **Image and Joint Encoding**: whole-image vectors and image+text fusion
//! - **Local ONNX Models**: CLIP ViT-B/32 via FastEmbed, no external API calls
//! - **Offline Backend**: a deterministic feature-hashing model for tests and dry runs
//! - **Async-First Design**: model work runs on tokio's blocking pool
//!
//! ## Quick Start
//!
//! ```no_run
//! use prism_embed::{EmbedConfig, JointEncoder, backends};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = EmbedConfig::clip_vit_b32("/tmp/models");
//! let backend = backends::clip_backend(config.clone()).await?;
//! let encoders = JointEncoder::from_backend(&backend, &config)?;
//!
//! let vector = encoders.text().encode("a dog catching a frisbee").await?;
//! assert_eq!(vector.len(), 512);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: encoder and backend configuration
//! - [`provider`]: model capability traits
//! - [`backends`]: concrete model backends
//! - [`encoder`]: text, image and joint encoders
//! - [`vector`]: normalization and pooling helpers
//! - [`downloader`]: HuggingFace tokenizer downloading
//! - [`error`]: error types and result handling

pub mod backends;
pub mod config;
pub mod downloader;
pub mod encoder;
pub mod error;
pub mod provider;
pub mod vector;

// Re-export main types for easy access
pub use config::{Combination, EmbedConfig, EmbedConfigBuilder, WindowConfig};
pub use encoder::{ImageEncoder, JointEncoder, TextEncoder, combine, load_image, windows};
pub use error::{EmbedError, Result};
pub use provider::{ImageModel, ModelBackend, TextModel};
pub use vector::Embedding;
