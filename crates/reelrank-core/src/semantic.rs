//! Chunked semantic index: per-document sentence-window chunks, each
//! embedded independently, searched by cosine similarity and aggregated
//! back up to a per-document score by max-pooling across its chunks.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::Document;
use crate::chunk::{chunk_text, ChunkParams};
use crate::error::{EngineError, EngineResult};
use crate::providers::EmbeddingProvider;
use crate::text::preview;

/// Metadata for one chunk row in the embedding matrix. Carries no chunk
/// text: once a chunk is embedded, only its back-reference survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_id: u32,
    pub chunk_idx: u32,
    #[serde(rename = "total_chunks")]
    pub chunk_count: u32,
}

/// The on-disk shape of `chunk_metadata.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadataFile {
    pub chunks: Vec<ChunkMetadata>,
    pub total_chunks: usize,
}

/// A single semantic search result, one per document (post max-pooling).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHit {
    pub id: u32,
    pub title: String,
    pub document: String,
    pub score: f32,
}

/// Row-major embedding matrix plus parallel chunk metadata.
#[derive(Debug, Clone)]
pub struct SemanticIndex {
    dim: usize,
    embeddings: Vec<f32>,
    metadata: Vec<ChunkMetadata>,
    documents: Arc<HashMap<u32, Document>>,
}

impl SemanticIndex {
    /// Chunk and embed every document, building the semantic index.
    ///
    /// `documents` is shared with the caller's other indexes, not cloned.
    /// Rejects an empty document set with [`EngineError::EmptyCorpus`].
    pub fn build(
        documents: Arc<HashMap<u32, Document>>,
        provider: &dyn EmbeddingProvider,
        chunk_params: ChunkParams,
    ) -> EngineResult<Self> {
        if documents.is_empty() {
            return Err(EngineError::EmptyCorpus);
        }

        let dim = provider.dim();
        let mut all_chunks: Vec<String> = Vec::new();
        let mut metadata = Vec::new();

        for doc in documents.values() {
            let text = format!("{} {}", doc.title, doc.description);
            let chunks = chunk_text(&text, chunk_params);
            let chunk_count = chunks.len() as u32;
            for (idx, chunk) in chunks.into_iter().enumerate() {
                metadata.push(ChunkMetadata { doc_id: doc.id, chunk_idx: idx as u32, chunk_count });
                all_chunks.push(chunk);
            }
        }

        let rows = provider.encode(&all_chunks)?;
        if rows.len() != metadata.len() {
            return Err(EngineError::ProviderError(format!(
                "embedding provider returned {} rows for {} chunks",
                rows.len(),
                metadata.len()
            )));
        }
        let mut embeddings = Vec::with_capacity(metadata.len() * dim);
        for row in rows {
            debug_assert_eq!(row.len(), dim);
            embeddings.extend_from_slice(&row);
        }

        Ok(Self { dim, embeddings, metadata, documents })
    }

    /// Reassemble a semantic index from a previously persisted matrix and
    /// metadata list. `documents` is shared with the caller's other
    /// indexes, not cloned.
    pub fn from_parts(
        dim: usize,
        embeddings: Vec<f32>,
        metadata: Vec<ChunkMetadata>,
        documents: Arc<HashMap<u32, Document>>,
    ) -> EngineResult<Self> {
        if metadata.len() * dim != embeddings.len() {
            return Err(EngineError::CacheStale(format!(
                "embedding matrix has {} floats but metadata implies {} rows x {} dim",
                embeddings.len(),
                metadata.len(),
                dim
            )));
        }
        Ok(Self { dim, embeddings, metadata, documents })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_chunks(&self) -> usize {
        self.metadata.len()
    }

    pub fn embeddings(&self) -> &[f32] {
        &self.embeddings
    }

    pub fn metadata(&self) -> &[ChunkMetadata] {
        &self.metadata
    }

    fn chunk_row(&self, idx: usize) -> &[f32] {
        &self.embeddings[idx * self.dim..(idx + 1) * self.dim]
    }

    /// Embed a raw query string through the same provider used at build
    /// time. Rejects an empty query.
    pub fn generate_query_embedding(
        &self,
        query: &str,
        provider: &dyn EmbeddingProvider,
    ) -> EngineResult<Vec<f32>> {
        if query.trim().is_empty() {
            return Err(EngineError::EmptyQuery);
        }
        provider.embed(query)
    }

    /// Score every chunk against `query_embedding` by cosine similarity,
    /// then max-pool chunk scores up to one score per document.
    ///
    /// Ties break on ascending document id for a stable ordering.
    pub fn search_chunks(&self, query_embedding: &[f32], limit: usize) -> Vec<SemanticHit> {
        let mut best: HashMap<u32, f32> = HashMap::new();

        for (chunk_idx, meta) in self.metadata.iter().enumerate() {
            let score = cosine_similarity(query_embedding, self.chunk_row(chunk_idx));
            best.entry(meta.doc_id).and_modify(|current| *current = current.max(score)).or_insert(score);
        }

        let mut hits: Vec<SemanticHit> = best
            .into_iter()
            .filter_map(|(doc_id, score)| {
                self.documents.get(&doc_id).map(|doc| SemanticHit {
                    id: doc.id,
                    title: doc.title.clone(),
                    document: preview(&doc.description),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| match b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal) {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        });
        hits.truncate(limit);
        hits
    }
}

/// Cosine similarity between two vectors. Returns `0.0` when either vector
/// has zero norm rather than dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashingEmbeddingProvider;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn catalog() -> Arc<HashMap<u32, Document>> {
        [
            Document {
                id: 1,
                title: "Brave".to_string(),
                description: "A Scottish princess defies tradition. She trains with a bow and arrow.".to_string(),
            },
            Document {
                id: 2,
                title: "Paddington".to_string(),
                description: "A bear from darkest Peru moves to London. He lives with the Brown family.".to_string(),
            },
        ]
        .into_iter()
        .map(|d| (d.id, d))
        .collect::<HashMap<_, _>>()
        .into()
    }

    fn provider() -> HashingEmbeddingProvider {
        HashingEmbeddingProvider::new(64, Arc::new(HashSet::new()))
    }

    #[test]
    fn build_rejects_empty_corpus() {
        let err = SemanticIndex::build(Arc::new(HashMap::new()), &provider(), ChunkParams::default()).unwrap_err();
        assert!(matches!(err, EngineError::EmptyCorpus));
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_handles_zero_vector() {
        let zero = vec![0.0, 0.0, 0.0];
        let other = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&zero, &other), 0.0);
    }

    #[test]
    fn search_chunks_finds_the_matching_document() {
        let provider = provider();
        let index = SemanticIndex::build(catalog(), &provider, ChunkParams::default()).unwrap();
        let query = index.generate_query_embedding("bear living in london", &provider).unwrap();
        let hits = index.search_chunks(&query, 2);
        assert_eq!(hits[0].title, "Paddington");
    }

    #[test]
    fn query_embedding_rejects_empty_query() {
        let provider = provider();
        let index = SemanticIndex::build(catalog(), &provider, ChunkParams::default()).unwrap();
        let err = index.generate_query_embedding("", &provider).unwrap_err();
        assert!(matches!(err, EngineError::EmptyQuery));
    }
}
