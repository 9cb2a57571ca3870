//! On-disk cache of encoded corpus features
//!
//! ```text
//! <cache_dir>/
//!   image_features.bin   rows: u64 LE, dim: u64 LE, rows * dim f32 LE
//!   text_features.bin    same layout
//!   meta.json            {image_paths, text_contents, text_ids, fingerprint?}
//! ```
//!
//! Each file is written to a temporary file in the cache directory and renamed
//! into place, so a crash mid-write never leaves a truncated cache file behind.

use crate::error::{Result, RetrieverError};
use crate::retrieval::corpus::CorpusSnapshot;
use prism_embed::Embedding;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const IMAGE_FEATURES_FILE: &str = "image_features.bin";
pub const TEXT_FEATURES_FILE: &str = "text_features.bin";
pub const META_FILE: &str = "meta.json";

const HEADER_LEN: usize = 16;

/// Corpus metadata stored next to the vector matrices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub image_paths: Vec<String>,
    pub text_contents: Vec<String>,
    pub text_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// A cached snapshot together with the fingerprint it was stored under
#[derive(Debug, Clone)]
pub struct CachedCorpus {
    pub snapshot: CorpusSnapshot,
    pub fingerprint: Option<String>,
}

/// Feature cache rooted at one directory
#[derive(Debug, Clone)]
pub struct FeatureCache {
    dir: PathBuf,
}

impl FeatureCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// All three cache files are present
    pub fn exists(&self) -> bool {
        [IMAGE_FEATURES_FILE, TEXT_FEATURES_FILE, META_FILE]
            .iter()
            .all(|name| self.file(name).is_file())
    }

    /// Read the snapshot back. Fails if any file is missing or inconsistent.
    pub async fn load(&self) -> Result<CachedCorpus> {
        let image_vectors = self.read_matrix(IMAGE_FEATURES_FILE).await?;
        let text_vectors = self.read_matrix(TEXT_FEATURES_FILE).await?;

        let meta_path = self.file(META_FILE);
        let meta: CacheMeta = serde_json::from_slice(&tokio::fs::read(&meta_path).await?)
            .map_err(|e| RetrieverError::cache(&meta_path, e.to_string()))?;

        if meta.image_paths.len() != image_vectors.len() {
            return Err(RetrieverError::cache(
                &meta_path,
                format!(
                    "{} image paths for {} image vectors",
                    meta.image_paths.len(),
                    image_vectors.len()
                ),
            ));
        }
        if meta.text_ids.len() != text_vectors.len()
            || meta.text_contents.len() != text_vectors.len()
        {
            return Err(RetrieverError::cache(
                &meta_path,
                format!(
                    "{} text ids and {} contents for {} text vectors",
                    meta.text_ids.len(),
                    meta.text_contents.len(),
                    text_vectors.len()
                ),
            ));
        }

        tracing::info!(
            "Loaded feature cache from {}: {} images, {} texts",
            self.dir.display(),
            image_vectors.len(),
            text_vectors.len()
        );
        Ok(CachedCorpus {
            snapshot: CorpusSnapshot {
                image_vectors,
                image_paths: meta.image_paths,
                text_vectors,
                text_contents: meta.text_contents,
                text_ids: meta.text_ids,
            },
            fingerprint: meta.fingerprint,
        })
    }

    /// Write all three files, replacing any previous cache
    pub async fn store(&self, snapshot: &CorpusSnapshot, fingerprint: Option<&str>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let image_bytes = encode_matrix(&snapshot.image_vectors)?;
        let text_bytes = encode_matrix(&snapshot.text_vectors)?;
        let meta = CacheMeta {
            image_paths: snapshot.image_paths.clone(),
            text_contents: snapshot.text_contents.clone(),
            text_ids: snapshot.text_ids.clone(),
            fingerprint: fingerprint.map(str::to_string),
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta)?;

        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            write_atomic(&dir, IMAGE_FEATURES_FILE, &image_bytes)?;
            write_atomic(&dir, TEXT_FEATURES_FILE, &text_bytes)?;
            // meta last: its presence marks the cache complete
            write_atomic(&dir, META_FILE, &meta_bytes)
        })
        .await??;

        tracing::info!("Wrote feature cache to {}", self.dir.display());
        Ok(())
    }

    async fn read_matrix(&self, name: &str) -> Result<Vec<Embedding>> {
        let path = self.file(name);
        let bytes = tokio::fs::read(&path).await?;
        decode_matrix(&bytes).map_err(|message| RetrieverError::cache(&path, message))
    }
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let target = dir.join(name);
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(&target)
        .map_err(|e| RetrieverError::cache(&target, e.error.to_string()))?;
    Ok(())
}

/// Serialize equal-width rows into the matrix layout
pub fn encode_matrix(rows: &[Embedding]) -> Result<Vec<u8>> {
    let dim = rows.first().map(Vec::len).unwrap_or(0);
    if let Some(bad) = rows.iter().find(|row| row.len() != dim) {
        return Err(RetrieverError::InvalidDimension {
            expected: dim,
            actual: bad.len(),
        });
    }

    let mut bytes = Vec::with_capacity(HEADER_LEN + rows.len() * dim * 4);
    bytes.extend_from_slice(&(rows.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&(dim as u64).to_le_bytes());
    for row in rows {
        if cfg!(target_endian = "little") {
            bytes.extend_from_slice(bytemuck::cast_slice::<f32, u8>(row));
        } else {
            for value in row {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
    }
    Ok(bytes)
}

/// Parse the matrix layout back into rows
pub fn decode_matrix(bytes: &[u8]) -> std::result::Result<Vec<Embedding>, String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!("file is {} bytes, shorter than the header", bytes.len()));
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    let mut word = [0u8; 8];
    word.copy_from_slice(&header[..8]);
    let rows = u64::from_le_bytes(word);
    word.copy_from_slice(&header[8..]);
    let dim = u64::from_le_bytes(word);
    if rows > 0 && dim == 0 {
        return Err(format!("header declares {rows} rows of width 0"));
    }
    let (rows, dim) = match (usize::try_from(rows), usize::try_from(dim)) {
        (Ok(rows), Ok(dim)) => (rows, dim),
        _ => return Err(format!("header overflows: {rows} rows of {dim}")),
    };

    let expected = rows
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| format!("header overflows: {rows} rows of {dim}"))?;
    if body.len() != expected {
        return Err(format!(
            "expected {expected} bytes for {rows} x {dim} floats, found {}",
            body.len()
        ));
    }

    // Copy into an f32 buffer: the byte slice has no alignment guarantee
    let mut values = vec![0f32; rows * dim];
    bytemuck::cast_slice_mut::<f32, u8>(&mut values).copy_from_slice(body);
    if cfg!(target_endian = "big") {
        for value in &mut values {
            *value = f32::from_bits(u32::from_le(value.to_bits()));
        }
    }

    if dim == 0 {
        return Ok(Vec::new());
    }
    Ok(values.chunks_exact(dim).map(<[f32]>::to_vec).collect())
}
