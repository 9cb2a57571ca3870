//! Small dense-vector helpers shared by the encoders and indices

use crate::error::{EmbedError, Result};

/// A dense embedding vector
pub type Embedding = Vec<f32>;

/// Euclidean length of a vector
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Rescale a vector to unit length in place.
///
/// Fails with [`EmbedError::ZeroNorm`] for a zero or non-finite norm instead of
/// producing NaNs.
pub fn normalize(vector: &mut [f32]) -> Result<()> {
    let norm = l2_norm(vector);
    if norm == 0.0 || !norm.is_finite() {
        return Err(EmbedError::ZeroNorm);
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
    Ok(())
}

/// Consume a vector and return its unit-length version
pub fn normalized(mut vector: Embedding) -> Result<Embedding> {
    normalize(&mut vector)?;
    Ok(vector)
}

/// Dot product of two equally sized vectors
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Element-wise arithmetic mean of a non-empty set of equally sized vectors
pub fn mean(vectors: &[Embedding]) -> Result<Embedding> {
    let first = vectors
        .first()
        .ok_or_else(|| EmbedError::invalid_config("Cannot pool an empty set of vectors"))?;
    let dim = first.len();
    let mut result = vec![0.0f32; dim];

    for vector in vectors {
        if vector.len() != dim {
            return Err(EmbedError::DimensionMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }
        for (acc, value) in result.iter_mut().zip(vector.iter()) {
            *acc += value;
        }
    }

    let count = vectors.len() as f32;
    for value in result.iter_mut() {
        *value /= count;
    }
    Ok(result)
}
