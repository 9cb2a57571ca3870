//! Corpus discovery, encoding and cache-aware preprocessing

use crate::config::{CacheValidation, DataSection};
use crate::error::{Result, RetrieverError};
use crate::storage::FeatureCache;
use prism_embed::{Embedding, JointEncoder, load_image};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Encoded corpus state shared by both indices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusSnapshot {
    pub image_vectors: Vec<Embedding>,
    pub image_paths: Vec<String>,
    pub text_vectors: Vec<Embedding>,
    pub text_contents: Vec<String>,
    pub text_ids: Vec<String>,
}

impl CorpusSnapshot {
    pub fn image_count(&self) -> usize {
        self.image_paths.len()
    }

    pub fn text_count(&self) -> usize {
        self.text_ids.len()
    }

    /// Width of the stored vectors, if any are stored
    pub fn dimension(&self) -> Option<usize> {
        self.image_vectors
            .first()
            .or_else(|| self.text_vectors.first())
            .map(Vec::len)
    }
}

/// One line of the text corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRecord {
    pub id: String,
    pub contents: String,
}

#[derive(Deserialize)]
struct RawTextRecord {
    id: Value,
    contents: String,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Image files directly inside `folder`, sorted by path
pub async fn list_images(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(RetrieverError::data(format!(
            "image folder not found: {}",
            folder.display()
        )));
    }

    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(folder).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && is_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Parse the JSONL text corpus. Blank lines are skipped.
pub fn parse_text_records(source: &str) -> Result<Vec<TextRecord>> {
    let mut records = Vec::new();
    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawTextRecord = serde_json::from_str(line)
            .map_err(|e| RetrieverError::data(format!("line {line_no}: {e}")))?;
        let id = match raw.id {
            Value::String(id) => id,
            Value::Number(id) => id.to_string(),
            other => {
                return Err(RetrieverError::data(format!(
                    "line {line_no}: id must be a string or number, found {other}"
                )));
            }
        };
        records.push(TextRecord {
            id,
            contents: raw.contents,
        });
    }
    Ok(records)
}

pub async fn read_text_records(path: &Path) -> Result<Vec<TextRecord>> {
    if !path.is_file() {
        return Err(RetrieverError::data(format!(
            "text corpus not found: {}",
            path.display()
        )));
    }
    let source = tokio::fs::read_to_string(path).await?;
    parse_text_records(&source).map_err(|e| match e {
        RetrieverError::Data { message } => {
            RetrieverError::data(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

/// BLAKE3 over the encoder settings and every corpus file's path and bytes
pub async fn fingerprint(images: &[PathBuf], text_jsonl: &Path, settings: &[u8]) -> Result<String> {
    let mut files = images.to_vec();
    files.push(text_jsonl.to_path_buf());
    let settings = settings.to_vec();

    tokio::task::spawn_blocking(move || -> Result<String> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(settings.len() as u64).to_le_bytes());
        hasher.update(&settings);
        for file in &files {
            let name = file.to_string_lossy();
            let bytes = std::fs::read(file)?;
            hasher.update(&(name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        Ok(hasher.finalize().to_hex().to_string())
    })
    .await?
}

/// Encode every readable image and every text record
pub async fn encode_corpus(
    encoder: &JointEncoder,
    images: &[PathBuf],
    texts: &[TextRecord],
) -> Result<CorpusSnapshot> {
    let mut snapshot = CorpusSnapshot::default();

    tracing::info!("Encoding {} images", images.len());
    for path in images {
        let image = match load_image(path).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("Skipping image {}: {}", path.display(), e);
                continue;
            }
        };
        let vector = match encoder.image().encode(&image).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!("Skipping image {}: {}", path.display(), e);
                continue;
            }
        };
        tracing::debug!("Encoded image {}", path.display());
        snapshot.image_vectors.push(vector);
        snapshot.image_paths.push(path.display().to_string());
    }

    tracing::info!("Encoding {} texts", texts.len());
    for record in texts {
        let vector = encoder.text().encode(&record.contents).await?;
        tracing::debug!("Encoded text {}", record.id);
        snapshot.text_vectors.push(vector);
        snapshot.text_contents.push(record.contents.clone());
        snapshot.text_ids.push(record.id.clone());
    }

    if snapshot.image_vectors.is_empty() {
        return Err(RetrieverError::EmptyCorpus {
            message: format!("no readable images among {} candidates", images.len()),
        });
    }
    if snapshot.text_vectors.is_empty() {
        return Err(RetrieverError::EmptyCorpus {
            message: "text corpus has no records".to_string(),
        });
    }
    Ok(snapshot)
}

/// Whether a preprocessing run was served from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

/// Load the corpus from the cache or encode it and write the cache.
///
/// `settings` identifies the encoder configuration and only matters for
/// [`CacheValidation::ContentHash`].
pub async fn load_or_preprocess(
    encoder: &JointEncoder,
    data: &DataSection,
    settings: &[u8],
) -> Result<(CorpusSnapshot, CacheOutcome)> {
    let cache = FeatureCache::new(&data.cache_dir);

    let expected_fingerprint = match data.cache_validation {
        CacheValidation::Path => None,
        CacheValidation::ContentHash => {
            let images = list_images(&data.image_folder).await?;
            if !data.text_jsonl.is_file() {
                return Err(RetrieverError::data(format!(
                    "text corpus not found: {}",
                    data.text_jsonl.display()
                )));
            }
            Some(fingerprint(&images, &data.text_jsonl, settings).await?)
        }
    };

    if cache.exists() {
        let cached = cache.load().await?;
        match &expected_fingerprint {
            Some(expected) if cached.fingerprint.as_ref() != Some(expected) => {
                tracing::info!(
                    "Feature cache at {} is stale, re-encoding corpus",
                    data.cache_dir.display()
                );
            }
            _ => {
                tracing::info!("Feature cache hit at {}", data.cache_dir.display());
                return Ok((cached.snapshot, CacheOutcome::Hit));
            }
        }
    } else {
        tracing::info!("Feature cache miss at {}", data.cache_dir.display());
    }

    let images = list_images(&data.image_folder).await?;
    let texts = read_text_records(&data.text_jsonl).await?;
    let snapshot = encode_corpus(encoder, &images, &texts).await?;
    cache
        .store(&snapshot, expected_fingerprint.as_deref())
        .await?;
    Ok((snapshot, CacheOutcome::Miss))
}
