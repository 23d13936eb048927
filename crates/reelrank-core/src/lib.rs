//! Hybrid lexical + semantic retrieval engine for a small movie catalog.
//!
//! Query flow: a raw query string is normalized once, then fans out to the
//! inverted index (BM25) and the semantic index (cosine similarity over
//! chunk embeddings) independently; their outputs are fused (weighted or
//! RRF) and, optionally, re-ranked by a sharper model before being handed
//! back to the caller. The engine never touches stdout or a process exit
//! code — that's the CLI's job.
//!
//! ```text
//! query -> normalize -> [ inverted index | semantic index ] -> fusion -> rerank -> caller
//! ```

pub mod bm25;
pub mod catalog;
pub mod chunk;
pub mod error;
pub mod eval;
pub mod fusion;
pub mod generation;
pub mod persistence;
pub mod providers;
pub mod rerank;
pub mod semantic;
pub mod text;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use bm25::{Bm25Params, DocLengths, DocMap, InvertedIndex, TermFrequencies};
use catalog::Document;
use chunk::ChunkParams;
use error::{EngineError, EngineResult};
use fusion::{rrf_fusion, weighted_fusion, FusedHit, DEFAULT_ALPHA, DEFAULT_RRF_K};
use providers::EmbeddingProvider;
use rerank::{rerank as dispatch_rerank, RerankStrategy, RerankedHit};
use semantic::{ChunkMetadataFile, SemanticIndex};

/// Oversampling factor: fetch `limit * SEARCH_OVERSAMPLE` candidates from
/// each side before fusing, so the fused top-`limit` isn't starved by a
/// document that ranks highly on only one signal.
pub const SEARCH_OVERSAMPLE: usize = 4;

/// The built retrieval engine: an inverted index and a semantic index over
/// the same document set, ready to search, fuse, and re-rank.
#[derive(Debug)]
pub struct Engine {
    documents: Arc<HashMap<u32, Document>>,
    inverted: InvertedIndex,
    semantic: SemanticIndex,
}

impl Engine {
    /// Build both indexes from a document set.
    pub fn build(
        documents: &[Document],
        stopwords: Arc<std::collections::HashSet<String>>,
        embedding_provider: &dyn EmbeddingProvider,
        bm25_params: Bm25Params,
        chunk_params: ChunkParams,
    ) -> EngineResult<Self> {
        if documents.is_empty() {
            return Err(EngineError::EmptyCorpus);
        }
        let doc_map: Arc<HashMap<u32, Document>> =
            Arc::new(documents.iter().map(|d| (d.id, d.clone())).collect());

        tracing::info!(num_docs = documents.len(), "building inverted index");
        let inverted = InvertedIndex::build(Arc::clone(&doc_map), stopwords, bm25_params)?;
        tracing::info!(num_docs = documents.len(), "building semantic index");
        let semantic = SemanticIndex::build(Arc::clone(&doc_map), embedding_provider, chunk_params)?;

        Ok(Self { documents: doc_map, inverted, semantic })
    }

    /// Reload both indexes from a cache directory written by [`Engine::save`].
    pub fn load(
        cache_dir: impl AsRef<Path>,
        stopwords: Arc<std::collections::HashSet<String>>,
        bm25_params: Bm25Params,
    ) -> EngineResult<Self> {
        let paths = persistence::ArtifactPaths::new(cache_dir);

        let postings: bm25::Postings = persistence::read_struct(&paths.postings)?;
        let doc_map: DocMap = persistence::read_struct(&paths.doc_map)?;
        let term_frequencies: TermFrequencies = persistence::read_struct(&paths.term_frequencies)?;
        let doc_lengths: DocLengths = persistence::read_struct(&paths.doc_lengths)?;

        let (rows, dim, embeddings) = persistence::read_matrix(&paths.chunk_embeddings)?;
        let metadata_file: ChunkMetadataFile = persistence::read_json(&paths.chunk_metadata)?;
        if metadata_file.chunks.len() != rows || metadata_file.total_chunks != metadata_file.chunks.len() {
            return Err(EngineError::CacheStale(format!(
                "chunk matrix has {rows} rows but metadata lists {} of {} chunks",
                metadata_file.chunks.len(),
                metadata_file.total_chunks
            )));
        }

        let documents: Arc<HashMap<u32, Document>> = Arc::new(doc_map.0);
        let inverted = InvertedIndex::from_parts(
            postings,
            term_frequencies,
            doc_lengths,
            Arc::clone(&documents),
            stopwords,
            bm25_params,
        );
        let semantic = SemanticIndex::from_parts(dim, embeddings, metadata_file.chunks, Arc::clone(&documents))?;

        Ok(Self { documents, inverted, semantic })
    }

    /// Persist both indexes to a cache directory for later [`Engine::load`].
    pub fn save(&self, cache_dir: impl AsRef<Path>) -> EngineResult<()> {
        let paths = persistence::ArtifactPaths::new(&cache_dir);
        persistence::write_struct(&paths.postings, &self.inverted.postings())?;
        persistence::write_struct(&paths.doc_map, &self.inverted.doc_map())?;
        persistence::write_struct(&paths.term_frequencies, &self.inverted.term_frequencies())?;
        persistence::write_struct(&paths.doc_lengths, &self.inverted.doc_lengths())?;
        persistence::write_matrix(
            &paths.chunk_embeddings,
            self.semantic.num_chunks(),
            self.semantic.dim(),
            self.semantic.embeddings(),
        )?;
        let chunks = self.semantic.metadata().to_vec();
        let metadata_file = ChunkMetadataFile { total_chunks: chunks.len(), chunks };
        persistence::write_json(&paths.chunk_metadata, &metadata_file)?;
        tracing::info!(dir = %cache_dir.as_ref().display(), "wrote cache artifacts");
        Ok(())
    }

    pub fn inverted_index(&self) -> &InvertedIndex {
        &self.inverted
    }

    pub fn semantic_index(&self) -> &SemanticIndex {
        &self.semantic
    }

    pub fn documents(&self) -> &HashMap<u32, Document> {
        &self.documents
    }

    /// Lexical-only search.
    pub fn bm25_search(&self, query: &str, limit: usize) -> EngineResult<Vec<bm25::BM25Hit>> {
        self.inverted.bm25_search(query, limit)
    }

    /// Semantic-only search.
    pub fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        embedding_provider: &dyn EmbeddingProvider,
    ) -> EngineResult<Vec<semantic::SemanticHit>> {
        let query_embedding = self.semantic.generate_query_embedding(query, embedding_provider)?;
        Ok(self.semantic.search_chunks(&query_embedding, limit))
    }

    /// Weighted-normalized fusion search: BM25 and semantic signals blended
    /// by `alpha` (BM25 share).
    pub fn weighted_search(
        &self,
        query: &str,
        alpha: f32,
        limit: usize,
        embedding_provider: &dyn EmbeddingProvider,
    ) -> EngineResult<Vec<FusedHit>> {
        let oversample = limit * SEARCH_OVERSAMPLE;
        let bm25_hits = self.bm25_search(query, oversample)?;
        let semantic_hits = self.semantic_search(query, oversample, embedding_provider)?;
        Ok(weighted_fusion(&bm25_hits, &semantic_hits, alpha, limit))
    }

    /// Reciprocal Rank Fusion search.
    pub fn rrf_search(
        &self,
        query: &str,
        k: f32,
        limit: usize,
        embedding_provider: &dyn EmbeddingProvider,
    ) -> EngineResult<Vec<FusedHit>> {
        let oversample = limit * SEARCH_OVERSAMPLE;
        let bm25_hits = self.bm25_search(query, oversample)?;
        let semantic_hits = self.semantic_search(query, oversample, embedding_provider)?;
        Ok(rrf_fusion(&bm25_hits, &semantic_hits, k, limit))
    }

    /// Run `rrf_search` with engine defaults (used by `search`/`evaluate`).
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        embedding_provider: &dyn EmbeddingProvider,
    ) -> EngineResult<Vec<FusedHit>> {
        self.rrf_search(query, DEFAULT_RRF_K, limit, embedding_provider)
    }

    /// Re-rank a fused candidate set with a sharper signal.
    pub fn rerank(
        &self,
        strategy: RerankStrategy,
        query: &str,
        candidates: &[FusedHit],
        cross_encoder: &dyn providers::CrossEncoderProvider,
        llm: &dyn providers::LlmRanker,
    ) -> EngineResult<Vec<RerankedHit>> {
        dispatch_rerank(strategy, query, candidates, &self.documents, cross_encoder, llm)
    }
}

/// A shared, cloneable handle to an [`Engine`] for callers juggling a single
/// loaded index across multiple CLI invocations or requests.
pub type SharedEngine = Arc<Mutex<Engine>>;

/// Default weighted-fusion alpha, re-exported for convenience.
pub const DEFAULT_WEIGHTED_ALPHA: f32 = DEFAULT_ALPHA;

/// Commonly used types, re-exported for `use reelrank_core::prelude::*;`.
pub mod prelude {
    pub use crate::bm25::{BM25Hit, Bm25Params, InvertedIndex};
    pub use crate::catalog::{load_catalog, load_golden_set, load_stopwords, Document, GoldenCase};
    pub use crate::chunk::ChunkParams;
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::eval::{evaluate, EvalSummary};
    pub use crate::fusion::FusedHit;
    pub use crate::providers::{
        CrossEncoderProvider, EmbeddingProvider, HashingEmbeddingProvider, HeuristicCrossEncoder,
        LlmProvider, LlmRanker, LocalHeuristicLlm, NoOpRateLimiter, RateLimiter,
    };
    pub use crate::rerank::{RerankStrategy, RerankedHit};
    pub use crate::semantic::SemanticHit;
    pub use crate::Engine;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn catalog() -> Vec<Document> {
        vec![
            Document {
                id: 1,
                title: "Brave".to_string(),
                description: "A Scottish princess defies tradition with her bow and arrow.".to_string(),
            },
            Document {
                id: 2,
                title: "Paddington".to_string(),
                description: "A bear from darkest Peru moves in with a family in London.".to_string(),
            },
            Document {
                id: 3,
                title: "The Revenant".to_string(),
                description: "A frontiersman is mauled by a bear and left for dead in the wilderness."
                    .to_string(),
            },
        ]
    }

    fn stopwords() -> Arc<HashSet<String>> {
        Arc::new(["a", "an", "the", "is", "in", "with", "and", "by", "for", "her", "from"]
            .iter()
            .map(|s| s.to_string())
            .collect())
    }

    #[test]
    fn build_rejects_empty_corpus() {
        let embedder = providers::HashingEmbeddingProvider::new(32, stopwords());
        let err = Engine::build(&[], stopwords(), &embedder, Bm25Params::default(), ChunkParams::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyCorpus));
    }

    #[test]
    fn weighted_search_ranks_bear_films_highly() {
        let embedder = providers::HashingEmbeddingProvider::new(32, stopwords());
        let engine = Engine::build(
            &catalog(),
            stopwords(),
            &embedder,
            Bm25Params::default(),
            ChunkParams::default(),
        )
        .unwrap();

        let hits = engine.weighted_search("bear in london", DEFAULT_WEIGHTED_ALPHA, 3, &embedder).unwrap();
        let titles: Vec<&str> = hits.iter().map(|h| h.title.as_str()).collect();
        assert!(titles.contains(&"Paddington"));
    }

    #[test]
    fn rrf_search_is_stable_across_repeated_calls() {
        let embedder = providers::HashingEmbeddingProvider::new(32, stopwords());
        let engine = Engine::build(
            &catalog(),
            stopwords(),
            &embedder,
            Bm25Params::default(),
            ChunkParams::default(),
        )
        .unwrap();

        let first = engine.rrf_search("scary bear", DEFAULT_RRF_K, 3, &embedder).unwrap();
        let second = engine.rrf_search("scary bear", DEFAULT_RRF_K, 3, &embedder).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn save_and_load_round_trips_search_results() {
        let embedder = providers::HashingEmbeddingProvider::new(32, stopwords());
        let engine = Engine::build(
            &catalog(),
            stopwords(),
            &embedder,
            Bm25Params::default(),
            ChunkParams::default(),
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        engine.save(dir.path()).unwrap();
        let reloaded = Engine::load(dir.path(), stopwords(), Bm25Params::default()).unwrap();

        let before = engine.rrf_search("bear", DEFAULT_RRF_K, 3, &embedder).unwrap();
        let after = reloaded.rrf_search("bear", DEFAULT_RRF_K, 3, &embedder).unwrap();
        assert_eq!(before, after);
    }
}
