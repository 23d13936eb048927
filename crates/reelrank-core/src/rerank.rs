//! Re-ranking fused candidates with a sharper, more expensive signal than
//! BM25 or cosine similarity: a cross-encoder, an LLM scoring documents one
//! at a time, or an LLM ordering a whole batch from a single prompt.
//!
//! Re-ranking is stateless across queries — each call runs the full
//! Search -> Fuse -> Rerank sequence fresh; nothing is cached between
//! queries at this layer.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::Document;
use crate::error::{EngineError, EngineResult};
use crate::fusion::FusedHit;
use crate::providers::{CrossEncoderProvider, LlmRanker};

/// The fused score and rank a candidate carried into re-ranking, kept
/// around for diagnostics after the sharper signal has reordered it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankSubscores {
    pub fused_score: f32,
    pub fused_rank: usize,
}

/// A fused candidate's score after re-ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedHit {
    pub id: u32,
    pub title: String,
    pub document: String,
    pub score: f32,
    pub subscores: RerankSubscores,
}

/// Which re-ranking signal to apply to the fused candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankStrategy {
    CrossEncoder,
    LlmIndividual,
    LlmBatch,
}

impl FromStr for RerankStrategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cross-encoder" | "cross_encoder" => Ok(Self::CrossEncoder),
            "llm-individual" | "llm_individual" => Ok(Self::LlmIndividual),
            "llm-batch" | "llm_batch" => Ok(Self::LlmBatch),
            other => Err(EngineError::UnknownRerankMethod(other.to_string())),
        }
    }
}

fn candidate_text(documents: &HashMap<u32, Document>, id: u32) -> String {
    documents
        .get(&id)
        .map(|d| format!("{} {}", d.title, d.description))
        .unwrap_or_default()
}

fn sort_reranked(hits: &mut [RerankedHit]) {
    hits.sort_by(|a, b| match b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal) {
        Ordering::Equal => a.id.cmp(&b.id),
        other => other,
    });
}

/// A candidate's pre-rerank fused score and its 1-based position in the
/// (already sorted) fused candidate list it came from.
fn fused_subscores(candidate: &FusedHit, index: usize) -> RerankSubscores {
    RerankSubscores { fused_score: candidate.score, fused_rank: index + 1 }
}

/// Score every candidate with a cross-encoder, in one batched call. Raw
/// scores, larger is better; a provider failure fails the whole call.
pub fn rerank_cross_encoder(
    query: &str,
    candidates: &[FusedHit],
    documents: &HashMap<u32, Document>,
    provider: &dyn CrossEncoderProvider,
) -> EngineResult<Vec<RerankedHit>> {
    let pairs: Vec<(String, String)> =
        candidates.iter().map(|c| (query.to_string(), candidate_text(documents, c.id))).collect();
    let scores = provider.predict(&pairs)?;

    let mut hits: Vec<RerankedHit> = candidates
        .iter()
        .zip(scores)
        .enumerate()
        .map(|(index, (c, score))| RerankedHit {
            id: c.id,
            title: c.title.clone(),
            document: c.document.clone(),
            score,
            subscores: fused_subscores(c, index),
        })
        .collect();

    sort_reranked(&mut hits);
    Ok(hits)
}

/// Ask an LLM to score each candidate independently, 0-10.
///
/// A single candidate's unparseable reply is demoted to a score of `0` and
/// logged; it does not fail the whole rerank, since the remaining
/// candidates' scores are still meaningful.
pub fn rerank_llm_individual(
    query: &str,
    candidates: &[FusedHit],
    documents: &HashMap<u32, Document>,
    llm: &dyn LlmRanker,
) -> EngineResult<Vec<RerankedHit>> {
    let mut hits: Vec<RerankedHit> = candidates
        .iter()
        .enumerate()
        .map(|(index, c)| {
            let text = candidate_text(documents, c.id);
            let score = match llm.score_individual(query, &text) {
                Ok(score) => score as f32,
                Err(e) => {
                    tracing::warn!(doc_id = c.id, error = %e, "LLM individual rerank score unparseable, demoting to 0");
                    0.0
                }
            };
            RerankedHit {
                id: c.id,
                title: c.title.clone(),
                document: c.document.clone(),
                score,
                subscores: fused_subscores(c, index),
            }
        })
        .collect();

    sort_reranked(&mut hits);
    Ok(hits)
}

/// Ask an LLM to order the whole candidate batch from a single prompt.
///
/// A malformed or incomplete ordering fails the entire call with
/// [`EngineError::RerankFailure`] — there's no way to salvage a partial
/// batch ordering the way there is for individual scores.
pub fn rerank_llm_batch(
    query: &str,
    candidates: &[FusedHit],
    documents: &HashMap<u32, Document>,
    llm: &dyn LlmRanker,
) -> EngineResult<Vec<RerankedHit>> {
    let batch_docs: Vec<Document> = candidates
        .iter()
        .filter_map(|c| documents.get(&c.id).cloned())
        .collect();

    let order = llm.order_batch(query, &batch_docs)?;

    let mut expected: Vec<u32> = candidates.iter().map(|c| c.id).collect();
    expected.sort_unstable();
    let mut returned = order.clone();
    returned.sort_unstable();
    if expected != returned {
        return Err(EngineError::RerankFailure(format!(
            "batch rerank returned {} ids, expected the same {} candidate ids",
            order.len(),
            candidates.len()
        )));
    }

    let by_id: HashMap<u32, &FusedHit> = candidates.iter().map(|c| (c.id, c)).collect();
    let fused_ranks: HashMap<u32, usize> =
        candidates.iter().enumerate().map(|(index, c)| (c.id, index + 1)).collect();
    let total = order.len();
    Ok(order
        .into_iter()
        .enumerate()
        .map(|(rank, id)| {
            let candidate = by_id.get(&id);
            RerankedHit {
                id,
                title: candidate.map(|c| c.title.clone()).unwrap_or_default(),
                document: candidate.map(|c| c.document.clone()).unwrap_or_default(),
                score: (total - rank) as f32,
                subscores: RerankSubscores {
                    fused_score: candidate.map(|c| c.score).unwrap_or(0.0),
                    fused_rank: fused_ranks.get(&id).copied().unwrap_or(0),
                },
            }
        })
        .collect())
}

/// Dispatch to the requested re-rank strategy.
pub fn rerank(
    strategy: RerankStrategy,
    query: &str,
    candidates: &[FusedHit],
    documents: &HashMap<u32, Document>,
    cross_encoder: &dyn CrossEncoderProvider,
    llm: &dyn LlmRanker,
) -> EngineResult<Vec<RerankedHit>> {
    match strategy {
        RerankStrategy::CrossEncoder => rerank_cross_encoder(query, candidates, documents, cross_encoder),
        RerankStrategy::LlmIndividual => rerank_llm_individual(query, candidates, documents, llm),
        RerankStrategy::LlmBatch => rerank_llm_batch(query, candidates, documents, llm),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{HeuristicCrossEncoder, LocalHeuristicLlm};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn documents() -> HashMap<u32, Document> {
        [
            (1, Document { id: 1, title: "Brave".to_string(), description: "princess archer".to_string() }),
            (2, Document { id: 2, title: "Paddington".to_string(), description: "bear london".to_string() }),
        ]
        .into_iter()
        .collect()
    }

    fn candidates() -> Vec<FusedHit> {
        use crate::fusion::FusionSubscores;
        let no_subscores =
            FusionSubscores { bm25_score: None, bm25_rank: None, semantic_score: None, semantic_rank: None };
        vec![
            FusedHit {
                id: 1,
                title: "Brave".to_string(),
                document: "princess archer".to_string(),
                score: 0.4,
                subscores: no_subscores,
            },
            FusedHit {
                id: 2,
                title: "Paddington".to_string(),
                document: "bear london".to_string(),
                score: 0.6,
                subscores: no_subscores,
            },
        ]
    }

    #[test]
    fn strategy_parses_known_names() {
        assert_eq!("cross-encoder".parse::<RerankStrategy>().unwrap(), RerankStrategy::CrossEncoder);
        assert_eq!("llm-batch".parse::<RerankStrategy>().unwrap(), RerankStrategy::LlmBatch);
    }

    #[test]
    fn strategy_rejects_unknown_names() {
        let err = "made-up-method".parse::<RerankStrategy>().unwrap_err();
        assert!(matches!(err, EngineError::UnknownRerankMethod(_)));
    }

    #[test]
    fn cross_encoder_rerank_favors_keyword_overlap() {
        let encoder = HeuristicCrossEncoder::new(Arc::new(HashSet::new()));
        let hits = rerank_cross_encoder("bear london", &candidates(), &documents(), &encoder).unwrap();
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn llm_batch_rerank_rejects_mismatched_ids() {
        struct BadRanker;
        impl LlmRanker for BadRanker {
            fn score_individual(&self, _: &str, _: &str) -> EngineResult<u32> {
                Ok(0)
            }
            fn order_batch(&self, _: &str, _: &[Document]) -> EngineResult<Vec<u32>> {
                Ok(vec![1]) // missing id 2
            }
        }
        let err = rerank_llm_batch("bear london", &candidates(), &documents(), &BadRanker).unwrap_err();
        assert!(matches!(err, EngineError::RerankFailure(_)));
    }

    #[test]
    fn llm_individual_rerank_demotes_failures_instead_of_failing() {
        struct FlakyRanker;
        impl LlmRanker for FlakyRanker {
            fn score_individual(&self, _: &str, document: &str) -> EngineResult<u32> {
                if document.contains("princess") {
                    Err(EngineError::ProviderError("malformed reply".to_string()))
                } else {
                    Ok(9)
                }
            }
            fn order_batch(&self, _: &str, _: &[Document]) -> EngineResult<Vec<u32>> {
                Ok(vec![])
            }
        }
        let hits = rerank_llm_individual("bear london", &candidates(), &documents(), &FlakyRanker).unwrap();
        let brave = hits.iter().find(|h| h.id == 1).unwrap();
        assert_eq!(brave.score, 0.0);
    }

    #[test]
    fn local_heuristic_llm_implements_llm_ranker() {
        let llm = LocalHeuristicLlm::new(Arc::new(HashSet::new()));
        let hits = rerank_llm_individual("bear london", &candidates(), &documents(), &llm).unwrap();
        assert_eq!(hits[0].id, 2);
    }
}
