//! Exact inner-product index

use super::{IndexBuilder, IndexParams, SearchHits, VectorIndex, check_dimensions, check_query};
use crate::error::Result;
use prism_embed::Embedding;
use prism_embed::vector::dot;

/// Brute-force ranking by dot product, descending
#[derive(Debug, Clone)]
pub struct FlatIndex {
    vectors: Vec<Embedding>,
    dim: usize,
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn search(&self, query: &[f32], k: usize) -> Result<SearchHits> {
        check_query(query, self.dim)?;

        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, vector)| (dot(query, vector), id))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, id)| (score, id as i64))
            .unzip())
    }

    fn name(&self) -> &str {
        "flat"
    }
}

#[derive(Debug, Clone)]
pub struct FlatIndexBuilder {
    dim: usize,
}

impl FlatIndexBuilder {
    pub fn new(params: IndexParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { dim: params.dim })
    }
}

impl IndexBuilder for FlatIndexBuilder {
    fn build(&self, vectors: &[Embedding]) -> Result<Box<dyn VectorIndex>> {
        check_dimensions(vectors, self.dim)?;
        tracing::info!("Built flat index: {} vectors, dim {}", vectors.len(), self.dim);
        Ok(Box::new(FlatIndex {
            vectors: vectors.to_vec(),
            dim: self.dim,
        }))
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &str {
        "flat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descending_inner_product() {
        let builder = FlatIndexBuilder::new(IndexParams {
            dim: 2,
            ..IndexParams::default()
        })
        .unwrap();
        let index = builder
            .build(&[vec![1.0, 0.0], vec![0.6, 0.8], vec![0.0, 1.0]])
            .unwrap();

        let (scores, ids) = index.search(&[0.0, 1.0], 5).unwrap();
        assert_eq!(ids, vec![2, 1, 0]);
        assert_eq!(scores, vec![1.0, 0.8, 0.0]);
    }
}
