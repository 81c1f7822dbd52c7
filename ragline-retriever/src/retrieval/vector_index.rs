//! Flat append-only vector index with inner-product search.
//!
//! Vectors are L2-normalized on the way in — both indexed and query vectors,
//! by the same code path — so the inner product computed at search time is
//! exactly cosine similarity and the metric stays bit-consistent between the
//! two sides.
//!
//! The index is append-only: there is no in-place update or deletion by
//! position. Removing or re-embedding a document is handled above this layer
//! by tombstoning the document and rebuilding the index.

/// A vector's length disagreed with the index dimension.
#[derive(Debug, thiserror::Error)]
#[error("vector has dimension {actual}, index expects {expected}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// In-memory flat index over L2-normalized vectors.
///
/// Storage is a single contiguous `Vec<f32>` in row-major order; position
/// `p` occupies `data[p * dimension .. (p + 1) * dimension]`. Positions are
/// assigned sequentially from 0 in insertion order and never reused.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given length.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Length of the vectors held by this index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Current vector count.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector, returning its assigned position.
    ///
    /// The vector is L2-normalized before insertion. A zero-norm vector is
    /// stored as-is and scores 0.0 against every query. Positions start at 0
    /// and increase monotonically.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, DimensionMismatch> {
        if vector.len() != self.dimension || self.dimension == 0 {
            return Err(DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let position = self.len();
        let norm = Self::l2_norm(vector);
        if norm > 0.0 {
            self.data.extend(vector.iter().map(|v| v / norm));
        } else {
            self.data.extend_from_slice(vector);
        }
        Ok(position)
    }

    /// Return up to `k` results ordered by descending score, ties broken by
    /// ascending position for determinism.
    ///
    /// The query is normalized with the same code path as indexed vectors.
    /// An empty index, `k == 0`, or a query of the wrong length all yield an
    /// empty result, never an error.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if query.len() != self.dimension || k == 0 || self.is_empty() {
            return Vec::new();
        }

        let norm = Self::l2_norm(query);
        let query: Vec<f32> = if norm > 0.0 {
            query.iter().map(|v| v / norm).collect()
        } else {
            return Vec::new();
        };

        let mut hits: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| {
                let score: f32 = row.iter().zip(query.iter()).map(|(a, b)| a * b).sum();
                (position, score)
            })
            .collect();

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(k);
        hits
    }

    fn l2_norm(vector: &[f32]) -> f32 {
        vector.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_assigned_sequentially() {
        let mut index = VectorIndex::new(3);
        assert_eq!(index.add(&[1.0, 0.0, 0.0]).unwrap(), 0);
        assert_eq!(index.add(&[0.0, 1.0, 0.0]).unwrap(), 1);
        assert_eq!(index.add(&[0.0, 0.0, 1.0]).unwrap(), 2);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_self_similarity_is_one() {
        let mut index = VectorIndex::new(4);
        // Deliberately unnormalized input
        index.add(&[3.0, -4.0, 12.0, 0.5]).unwrap();

        let hits = index.search(&[3.0, -4.0, 12.0, 0.5], 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_index_returns_empty() {
        let index = VectorIndex::new(8);
        assert!(index.search(&[1.0; 8], 5).is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = VectorIndex::new(3);
        let err = index.add(&[1.0, 0.0]).unwrap_err();
        assert_eq!(err.expected, 3);
        assert_eq!(err.actual, 2);

        // Mismatched query yields no results rather than an error
        index.add(&[1.0, 0.0, 0.0]).unwrap();
        assert!(index.search(&[1.0, 0.0], 1).is_empty());
    }

    #[test]
    fn test_descending_scores_with_cap() {
        let mut index = VectorIndex::new(2);
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();
        index.add(&[1.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 0);
        assert!(hits[0].1 > hits[1].1);
        assert_eq!(hits[1].0, 2);
    }

    #[test]
    fn test_ties_broken_by_ascending_position() {
        let mut index = VectorIndex::new(2);
        // Same direction twice: identical scores
        index.add(&[2.0, 0.0]).unwrap();
        index.add(&[5.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 3);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 1);
        assert_eq!(hits[2].0, 2);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let mut index = VectorIndex::new(2);
        index.add(&[0.0, 0.0]).unwrap();
        index.add(&[1.0, 0.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits[1].1, 0.0);

        // Zero-norm query cannot be normalized, so nothing matches
        assert!(index.search(&[0.0, 0.0], 2).is_empty());
    }
}
