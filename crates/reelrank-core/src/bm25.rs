//! Inverted index and Okapi BM25 scoring.
//!
//! The index maps each normalized term to the set of documents it appears
//! in, along with a per-document term frequency. Candidate generation for a
//! query is the union of postings for its terms; scoring and the final
//! top-k cut happen on that candidate set only, never the whole corpus.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::Document;
use crate::error::{EngineError, EngineResult};
use crate::text::{normalize, preview};

/// Okapi BM25 tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// A single BM25 search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BM25Hit {
    pub id: u32,
    pub title: String,
    pub document: String,
    pub score: f32,
}

/// Postings and term-frequency tables, serialized independently so each can
/// be cache-validated on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Postings(pub HashMap<String, HashSet<u32>>);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermFrequencies(pub HashMap<String, HashMap<u32, u32>>);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocLengths(pub HashMap<u32, u32>);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocMap(pub HashMap<u32, Document>);

/// The lexical half of the engine: postings, term frequencies, document
/// lengths, and the documents themselves.
#[derive(Debug, Clone)]
pub struct InvertedIndex {
    postings: HashMap<String, HashSet<u32>>,
    term_frequencies: HashMap<String, HashMap<u32, u32>>,
    doc_lengths: HashMap<u32, u32>,
    documents: Arc<HashMap<u32, Document>>,
    avg_doc_length: f32,
    params: Bm25Params,
    stopwords: Arc<HashSet<String>>,
}

impl InvertedIndex {
    /// Build the index from a document set: each document's `title` and
    /// `description` are concatenated, normalized, and indexed by term.
    ///
    /// `documents` is shared with the caller's other indexes, not cloned.
    /// Rejects an empty document set with [`EngineError::EmptyCorpus`].
    pub fn build(
        documents: Arc<HashMap<u32, Document>>,
        stopwords: Arc<HashSet<String>>,
        params: Bm25Params,
    ) -> EngineResult<Self> {
        if documents.is_empty() {
            return Err(EngineError::EmptyCorpus);
        }

        let mut postings: HashMap<String, HashSet<u32>> = HashMap::new();
        let mut term_frequencies: HashMap<String, HashMap<u32, u32>> = HashMap::new();
        let mut doc_lengths: HashMap<u32, u32> = HashMap::new();

        for doc in documents.values() {
            let text = format!("{} {}", doc.title, doc.description);
            let terms = normalize(&text, &stopwords);
            doc_lengths.insert(doc.id, terms.len() as u32);

            for term in terms {
                postings.entry(term.clone()).or_default().insert(doc.id);
                *term_frequencies
                    .entry(term)
                    .or_default()
                    .entry(doc.id)
                    .or_insert(0) += 1;
            }
        }

        let total_length: u64 = doc_lengths.values().map(|&len| len as u64).sum();
        let avg_doc_length = total_length as f32 / doc_lengths.len() as f32;

        Ok(Self { postings, term_frequencies, doc_lengths, documents, avg_doc_length, params, stopwords })
    }

    /// Reassemble an index from previously persisted artifacts. `documents`
    /// is shared with the caller's other indexes, not cloned.
    pub fn from_parts(
        postings: Postings,
        term_frequencies: TermFrequencies,
        doc_lengths: DocLengths,
        documents: Arc<HashMap<u32, Document>>,
        stopwords: Arc<HashSet<String>>,
        params: Bm25Params,
    ) -> Self {
        let total_length: u64 = doc_lengths.0.values().map(|&len| len as u64).sum();
        let avg_doc_length = if doc_lengths.0.is_empty() {
            0.0
        } else {
            total_length as f32 / doc_lengths.0.len() as f32
        };
        Self {
            postings: postings.0,
            term_frequencies: term_frequencies.0,
            doc_lengths: doc_lengths.0,
            documents,
            avg_doc_length,
            params,
            stopwords,
        }
    }

    pub fn postings(&self) -> Postings {
        Postings(self.postings.clone())
    }

    pub fn term_frequencies(&self) -> TermFrequencies {
        TermFrequencies(self.term_frequencies.clone())
    }

    pub fn doc_lengths(&self) -> DocLengths {
        DocLengths(self.doc_lengths.clone())
    }

    pub fn doc_map(&self) -> DocMap {
        DocMap((*self.documents).clone())
    }

    pub fn num_docs(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn avg_doc_length(&self) -> f32 {
        self.avg_doc_length
    }

    /// Raw term frequency of `term` in document `doc_id`.
    pub fn tf(&self, doc_id: u32, term: &str) -> u32 {
        self.term_frequencies
            .get(term)
            .and_then(|docs| docs.get(&doc_id))
            .copied()
            .unwrap_or(0)
    }

    /// Number of documents `term` appears in.
    pub fn df(&self, term: &str) -> u32 {
        self.postings.get(term).map(|docs| docs.len() as u32).unwrap_or(0)
    }

    /// Smoothed inverse document frequency: `ln((N+1)/(df+1))`. Always
    /// non-negative, unlike the classic unsmoothed IDF.
    pub fn idf(&self, term: &str) -> f32 {
        let n = self.num_docs() as f32;
        let df = self.df(term) as f32;
        ((n + 1.0) / (df + 1.0)).ln()
    }

    /// BM25's own IDF variant: `ln((N - df + 0.5) / (df + 0.5) + 1)`.
    pub fn bm25_idf(&self, term: &str) -> f32 {
        let n = self.num_docs() as f32;
        let df = self.df(term) as f32;
        (((n - df + 0.5) / (df + 0.5)) + 1.0).ln()
    }

    /// Length-normalized, saturating term frequency used by BM25.
    pub fn bm25_tf(&self, doc_id: u32, term: &str) -> f32 {
        let tf = self.tf(doc_id, term) as f32;
        if tf == 0.0 {
            return 0.0;
        }
        let Bm25Params { k1, b } = self.params;
        let doc_len = self.doc_lengths.get(&doc_id).copied().unwrap_or(0) as f32;
        let norm = 1.0 - b + b * (doc_len / self.avg_doc_length.max(1e-9));
        (tf * (k1 + 1.0)) / (tf + k1 * norm)
    }

    /// BM25 contribution of a single term to a single document.
    pub fn bm25(&self, doc_id: u32, term: &str) -> f32 {
        self.bm25_tf(doc_id, term) * self.bm25_idf(term)
    }

    /// Classic TF-IDF contribution of a single term to a single document,
    /// using the smoothed [`InvertedIndex::idf`] (not `bm25_idf`).
    pub fn tfidf(&self, doc_id: u32, term: &str) -> f32 {
        self.tf(doc_id, term) as f32 * self.idf(term)
    }

    /// Score and rank documents against a free-text query.
    ///
    /// The query is normalized internally; callers pass raw text. Documents
    /// that share no term with the query never enter the candidate set.
    /// Ties break on ascending document id for a stable ordering.
    pub fn bm25_search(&self, query: &str, limit: usize) -> EngineResult<Vec<BM25Hit>> {
        let terms = normalize(query, &self.stopwords);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: HashSet<u32> = HashSet::new();
        for term in &terms {
            if let Some(docs) = self.postings.get(term) {
                candidates.extend(docs.iter().copied());
            }
        }

        let mut scored: Vec<(u32, f32)> = candidates
            .into_iter()
            .map(|doc_id| {
                let score = terms.iter().map(|term| self.bm25(doc_id, term)).sum();
                (doc_id, score)
            })
            .collect();

        scored.sort_by(|a, b| match b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .filter_map(|(doc_id, score)| {
                self.documents.get(&doc_id).map(|doc| BM25Hit {
                    id: doc.id,
                    title: doc.title.clone(),
                    document: preview(&doc.description),
                    score,
                })
            })
            .collect())
    }
}
