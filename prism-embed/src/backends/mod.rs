//! Concrete model backends
//!
//! - [`FastEmbedClip`]: CLIP ViT-B/32 run locally through fastembed
//! - [`HashingModel`]: weight-free deterministic model for offline use and tests

mod fastembed_clip;
mod hashing;

pub use fastembed_clip::FastEmbedClip;
pub use hashing::{BOS_TOKEN, EOS_TOKEN, HashingModel};

use crate::config::EmbedConfig;
use crate::error::Result;
use crate::provider::ModelBackend;
use std::sync::Arc;

/// Load the CLIP backend described by `config`
pub async fn clip_backend(config: EmbedConfig) -> Result<ModelBackend> {
    let clip = FastEmbedClip::create(config).await?;
    Ok(ModelBackend::from_shared(Arc::new(clip)))
}

/// Build the offline hashing backend described by `config`
pub fn hashing_backend(config: &EmbedConfig) -> Result<ModelBackend> {
    let model = HashingModel::from_config(config)?;
    Ok(ModelBackend::from_shared(Arc::new(model)))
}
