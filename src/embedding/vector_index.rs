/// HNSW vector index for similarity search
use crate::retrieval::{BackendError, VectorSearchBackend};
use async_trait::async_trait;
use hnsw_rs::prelude::*;
use thiserror::Error;

/// Maximum number of HNSW layers
const MAX_LAYERS: usize = 16;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Invalid index parameter: {0}")]
    InvalidParameter(String),
}

/// HNSW graph parameters
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    /// Connections per node per layer
    pub m: usize,
    /// Candidate list size while building
    pub ef_construction: usize,
    /// Candidate list size while searching
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

/// In-process HNSW index over document embeddings.
///
/// HNSW ids are positions in `document_ids`, so the index answers with
/// corpus document ids and cosine distances.
pub struct HnswVectorIndex {
    index: Hnsw<'static, f32, DistCosine>,
    document_ids: Vec<String>,
    dimension: usize,
    ef_search: usize,
}

impl HnswVectorIndex {
    /// Create an empty index sized for `capacity` vectors
    pub fn new(
        dimension: usize,
        capacity: usize,
        params: HnswParams,
    ) -> Result<Self, VectorIndexError> {
        if dimension == 0 {
            return Err(VectorIndexError::InvalidParameter(
                "dimension must be positive".to_string(),
            ));
        }
        if params.m == 0 || params.ef_construction == 0 || params.ef_search == 0 {
            return Err(VectorIndexError::InvalidParameter(format!(
                "m, ef_construction and ef_search must be positive: {:?}",
                params
            )));
        }

        let index = Hnsw::<f32, DistCosine>::new(
            params.m,
            capacity.max(1),
            MAX_LAYERS,
            params.ef_construction,
            DistCosine,
        );

        Ok(Self {
            index,
            document_ids: Vec::with_capacity(capacity),
            dimension,
            ef_search: params.ef_search,
        })
    }

    /// Insert the embedding of one document
    pub fn insert(&mut self, document_id: &str, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let id = self.document_ids.len();
        self.index.insert((vector, id));
        self.document_ids.push(document_id.to_string());

        Ok(())
    }

    /// k nearest neighbours as (document_id, cosine distance), nearest first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let ef = self.ef_search.max(k);
        let neighbours = self.index.search(query, k, ef);

        Ok(neighbours
            .into_iter()
            .filter_map(|n| {
                self.document_ids
                    .get(n.d_id)
                    .map(|id| (id.clone(), n.distance))
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.document_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl VectorSearchBackend for HnswVectorIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<(String, f32)>, BackendError> {
        self.search(vector, top_k)
            .map_err(|e| BackendError::unavailable(self.name(), e))
    }

    fn name(&self) -> &str {
        "hnsw"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dimension: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn test_index_creation() {
        let index = HnswVectorIndex::new(8, 10, HnswParams::default()).unwrap();
        assert_eq!(index.dimension(), 8);
        assert!(index.is_empty());
        assert!(HnswVectorIndex::new(0, 10, HnswParams::default()).is_err());
    }

    #[test]
    fn test_insert_and_search() {
        let mut index = HnswVectorIndex::new(8, 10, HnswParams::default()).unwrap();

        index.insert("a", &unit(8, 0)).unwrap();
        index.insert("b", &unit(8, 1)).unwrap();
        let mut near_a = unit(8, 0);
        near_a[1] = 0.1;
        index.insert("c", &near_a).unwrap();
        assert_eq!(index.len(), 3);

        let results = index.search(&unit(8, 0), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "a");
        assert!(results[0].1 < 0.01);
        assert_eq!(results[1].0, "c");
    }

    #[test]
    fn test_dimension_validation() {
        let mut index = HnswVectorIndex::new(8, 10, HnswParams::default()).unwrap();
        assert!(index.insert("a", &[1.0; 4]).is_err());
        assert!(index.search(&[1.0; 4], 1).is_err());
    }

    #[tokio::test]
    async fn test_backend_query() {
        let mut index = HnswVectorIndex::new(4, 4, HnswParams::default()).unwrap();
        index.insert("doc_0", &unit(4, 2)).unwrap();

        let results = index.query(&unit(4, 2), 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "doc_0");

        let err = index.query(&[1.0], 5).await.unwrap_err();
        assert_eq!(err.backend(), "hnsw");
    }
}
