//! Random-hyperplane LSH
//!
//! Each vector is projected onto `nbits` Gaussian directions and keeps only the
//! signs, packed into `u64` words. Search ranks every stored signature by
//! Hamming distance to the query signature. Similar vectors share most sign
//! bits, so the ranking approximates cosine similarity.

use super::{IndexBuilder, IndexParams, SearchHits, VectorIndex, check_dimensions, check_query};
use crate::error::Result;
use prism_embed::Embedding;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Seeded projection shared by an index and its queries
#[derive(Debug, Clone)]
struct Projection {
    /// Row-major `nbits x dim`
    planes: Vec<f32>,
    dim: usize,
    nbits: usize,
}

impl Projection {
    fn new(dim: usize, nbits: usize, seed: u64) -> Self {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let planes = (0..nbits * dim)
            .map(|_| rng.sample::<f32, _>(StandardNormal))
            .collect();
        Self { planes, dim, nbits }
    }

    fn words(&self) -> usize {
        self.nbits.div_ceil(64)
    }

    fn signature(&self, vector: &[f32]) -> Vec<u64> {
        let mut packed = vec![0u64; self.words()];
        for (bit, plane) in self.planes.chunks_exact(self.dim).enumerate() {
            let projection: f32 = plane.iter().zip(vector).map(|(p, v)| p * v).sum();
            if projection > 0.0 {
                packed[bit / 64] |= 1u64 << (bit % 64);
            }
        }
        packed
    }
}

fn hamming_distance(a: &[u64], b: &[u64]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Hamming-ranked sign-bit index
#[derive(Debug, Clone)]
pub struct LshIndex {
    projection: Projection,
    /// Row-major signatures, `words` per row
    signatures: Vec<u64>,
    rows: usize,
}

impl LshIndex {
    pub fn nbits(&self) -> usize {
        self.projection.nbits
    }

    fn row(&self, id: usize) -> &[u64] {
        let words = self.projection.words();
        &self.signatures[id * words..(id + 1) * words]
    }
}

impl VectorIndex for LshIndex {
    fn dimension(&self) -> usize {
        self.projection.dim
    }

    fn len(&self) -> usize {
        self.rows
    }

    /// Ascending Hamming distance, ties by ascending id.
    /// Scores are `1 - hamming / nbits`.
    fn search(&self, query: &[f32], k: usize) -> Result<SearchHits> {
        check_query(query, self.projection.dim)?;
        let target = self.projection.signature(query);

        let mut ranked: Vec<(u32, usize)> = (0..self.rows)
            .map(|id| (hamming_distance(&target, self.row(id)), id))
            .collect();
        ranked.sort_unstable();
        ranked.truncate(k);

        let nbits = self.projection.nbits as f32;
        Ok(ranked
            .into_iter()
            .map(|(distance, id)| (1.0 - distance as f32 / nbits, id as i64))
            .unzip())
    }

    fn name(&self) -> &str {
        "lsh"
    }
}

/// Builds [`LshIndex`] instances with a fixed projection
#[derive(Debug, Clone)]
pub struct LshIndexBuilder {
    params: IndexParams,
}

impl LshIndexBuilder {
    pub fn new(params: IndexParams) -> Result<Self> {
        params.validate()?;
        if params.use_gpu {
            tracing::warn!("GPU placement requested for LSH index; serving from CPU");
        }
        Ok(Self { params })
    }
}

impl IndexBuilder for LshIndexBuilder {
    fn build(&self, vectors: &[Embedding]) -> Result<Box<dyn VectorIndex>> {
        check_dimensions(vectors, self.params.dim)?;
        let projection = Projection::new(self.params.dim, self.params.nbits, self.params.seed);

        let mut signatures = Vec::with_capacity(vectors.len() * projection.words());
        for vector in vectors {
            signatures.extend(projection.signature(vector));
        }

        tracing::info!(
            "Built LSH index: {} vectors, dim {}, {} bits",
            vectors.len(),
            self.params.dim,
            self.params.nbits
        );
        Ok(Box::new(LshIndex {
            projection,
            signatures,
            rows: vectors.len(),
        }))
    }

    fn dimension(&self) -> usize {
        self.params.dim
    }

    fn name(&self) -> &str {
        "lsh"
    }
}
