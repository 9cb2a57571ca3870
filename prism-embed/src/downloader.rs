//! HuggingFace tokenizer downloading
//!
//! fastembed manages the ONNX weights itself, but the chunked text encoder needs
//! direct access to the tokenizer to cut long inputs into windows. The
//! tokenizer is fetched once from the Hub and kept next to the model cache.

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use hf_hub::api::tokio::{Api, ApiBuilder};
use std::path::PathBuf;
use tokio::fs;

/// File name of a serialized `tokenizers` tokenizer
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Downloads tokenizer files from HuggingFace Hub
pub struct ModelDownloader {
    api: Api,
}

impl ModelDownloader {
    /// Create a downloader whose Hub cache lives under `cache_dir/hub`.
    pub fn new(config: &EmbedConfig) -> Result<Self> {
        let api = ApiBuilder::new()
            .with_cache_dir(config.cache_dir.join("hub"))
            .with_progress(false)
            .build()
            .map_err(EmbedError::model_init)?;
        Ok(Self { api })
    }

    /// Local path of the tokenizer for a configuration
    pub fn tokenizer_path(config: &EmbedConfig) -> PathBuf {
        config.model_path().join(TOKENIZER_FILE)
    }

    /// Make sure `tokenizer.json` exists in the model directory and return its path.
    ///
    /// # Errors
    /// - `InvalidConfig` if no tokenizer repository is configured and the file is absent
    /// - Network or HuggingFace API errors during the download
    /// - File system errors while copying into the model directory
    pub async fn ensure_tokenizer(&self, config: &EmbedConfig) -> Result<PathBuf> {
        let local_path = Self::tokenizer_path(config);
        if local_path.exists() {
            tracing::debug!("Tokenizer already present: {}", local_path.display());
            return Ok(local_path);
        }

        let repo_id = config.tokenizer_repo().ok_or_else(|| {
            EmbedError::invalid_config(format!(
                "No tokenizer repository configured and {} is missing",
                local_path.display()
            ))
        })?;

        tracing::info!(
            "Downloading tokenizer for {} from {}",
            config.model_name,
            repo_id
        );

        fs::create_dir_all(config.model_path()).await?;

        let repo = self.api.repo(hf_hub::Repo::with_revision(
            repo_id.to_string(),
            hf_hub::RepoType::Model,
            config.tokenizer_revision().to_string(),
        ));

        let downloaded = repo
            .get(TOKENIZER_FILE)
            .await
            .map_err(EmbedError::model_init)?;
        fs::copy(&downloaded, &local_path).await?;

        tracing::info!("Tokenizer stored at {}", local_path.display());
        Ok(local_path)
    }
}
