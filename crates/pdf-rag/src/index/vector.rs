//! Exact inner-product index over L2-normalised chunk embeddings

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ChunkId;

const FORMAT_VERSION: u32 = 1;

/// Nearest-neighbour hit
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: ChunkId,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Flat vector index; vectors are stored row-major
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    version: u32,
    dimensions: usize,
    ids: Vec<ChunkId>,
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// Build from parallel id/embedding lists
    pub fn build(dimensions: usize, ids: &[ChunkId], embeddings: &[Vec<f32>]) -> Result<Self> {
        if ids.len() != embeddings.len() {
            return Err(Error::internal(format!(
                "{} chunk ids but {} embeddings",
                ids.len(),
                embeddings.len()
            )));
        }

        let mut vectors = Vec::with_capacity(ids.len() * dimensions);
        for (id, embedding) in ids.iter().zip(embeddings) {
            if embedding.len() != dimensions {
                return Err(Error::embedding(format!(
                    "chunk {} has {} dimensions, expected {}",
                    id,
                    embedding.len(),
                    dimensions
                )));
            }
            vectors.extend(normalize(embedding));
        }

        Ok(Self {
            version: FORMAT_VERSION,
            dimensions,
            ids: ids.to_vec(),
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Top-k by cosine similarity; ties go to the lower chunk id
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            return Err(Error::embedding(format!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.dimensions
            )));
        }

        let query = normalize(query);
        let mut hits: Vec<VectorHit> = self
            .vectors
            .chunks_exact(self.dimensions)
            .zip(&self.ids)
            .map(|(row, id)| VectorHit {
                chunk_id: *id,
                score: dot(row, &query),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| Error::internal(format!("Failed to encode vector index: {}", e)))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let (index, _): (Self, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| Error::internal(format!("Failed to decode vector index: {}", e)))?;

        if index.version != FORMAT_VERSION {
            return Err(Error::internal(format!(
                "unsupported vector index version {}",
                index.version
            )));
        }
        if index.vectors.len() != index.ids.len() * index.dimensions {
            return Err(Error::internal("vector index is truncated"));
        }
        Ok(index)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = dot(v, v).sqrt();
    if norm > f32::EPSILON {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_orders_by_cosine() {
        let index = VectorIndex::build(
            2,
            &[0, 1, 2],
            &[vec![1.0, 0.0], vec![0.0, 5.0], vec![3.0, 3.0]],
        )
        .unwrap();

        let hits = index.search(&[0.0, 1.0], 3).unwrap();
        let ids: Vec<ChunkId> = hits.iter().map(|h| h.chunk_id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ties_break_on_chunk_id() {
        let index = VectorIndex::build(2, &[7, 3], &[vec![1.0, 0.0], vec![2.0, 0.0]]).unwrap();
        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].chunk_id, 3);
        assert_eq!(hits[1].chunk_id, 7);
    }

    #[test]
    fn test_dimension_mismatch() {
        assert!(VectorIndex::build(3, &[0], &[vec![1.0]]).is_err());
        let index = VectorIndex::build(2, &[0], &[vec![1.0, 0.0]]).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = VectorIndex::build(4, &[], &[]).unwrap();
        assert!(index.search(&[0.0; 4], 5).unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let index =
            VectorIndex::build(3, &[4, 9], &[vec![1.0, 2.0, 3.0], vec![0.0, 1.0, 0.0]]).unwrap();
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dimensions(), 3);
        assert_eq!(
            loaded.search(&[0.0, 1.0, 0.0], 1).unwrap()[0].chunk_id,
            9
        );
    }
}
