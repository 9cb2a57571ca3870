//! In-memory vector indices
//!
//! An index is built once from a full matrix of unit vectors and is read-only
//! afterwards. Adding items means rebuilding from the updated matrix.
//!
//! - [`lsh`]: random-hyperplane LSH with Hamming ranking
//! - [`flat`]: exact inner-product ranking

pub mod flat;
pub mod lsh;

pub use flat::{FlatIndex, FlatIndexBuilder};
pub use lsh::{LshIndex, LshIndexBuilder};

use crate::error::{Result, RetrieverError};
use prism_embed::Embedding;
use serde::{Deserialize, Serialize};

/// Scores and row ids, best first. Both vectors have the same length.
pub type SearchHits = (Vec<f32>, Vec<i64>);

pub const DEFAULT_NBITS: usize = 512;
pub const DEFAULT_SEED: u64 = 1234;

/// Parameters shared by the built-in indexers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    #[serde(default = "default_dim")]
    pub dim: usize,
    #[serde(default = "default_nbits")]
    pub nbits: usize,
    #[serde(default)]
    pub use_gpu: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_dim() -> usize {
    prism_embed::config::DEFAULT_DIMENSION
}

fn default_nbits() -> usize {
    DEFAULT_NBITS
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            dim: default_dim(),
            nbits: default_nbits(),
            use_gpu: false,
            seed: default_seed(),
        }
    }
}

impl IndexParams {
    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(RetrieverError::config("indexer dim must be greater than zero"));
        }
        if self.nbits == 0 {
            return Err(RetrieverError::config("indexer nbits must be greater than zero"));
        }
        Ok(())
    }
}

/// A searchable, immutable set of vectors
pub trait VectorIndex: Send + Sync {
    fn dimension(&self) -> usize;

    /// Number of indexed vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `k` nearest rows in the index's native order.
    ///
    /// Asking for more rows than exist returns every row.
    fn search(&self, query: &[f32], k: usize) -> Result<SearchHits>;

    fn name(&self) -> &str;
}

/// Builds an index from a full vector matrix
pub trait IndexBuilder: Send + Sync {
    fn build(&self, vectors: &[Embedding]) -> Result<Box<dyn VectorIndex>>;

    /// Width every vector must have
    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

/// Reject any vector whose width differs from `dim`
pub(crate) fn check_dimensions(vectors: &[Embedding], dim: usize) -> Result<()> {
    match vectors.iter().find(|v| v.len() != dim) {
        Some(bad) => Err(RetrieverError::InvalidDimension {
            expected: dim,
            actual: bad.len(),
        }),
        None => Ok(()),
    }
}

pub(crate) fn check_query(query: &[f32], dim: usize) -> Result<()> {
    if query.len() != dim {
        return Err(RetrieverError::InvalidDimension {
            expected: dim,
            actual: query.len(),
        });
    }
    Ok(())
}
