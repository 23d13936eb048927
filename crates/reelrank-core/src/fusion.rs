//! Fusing a lexical ranking and a semantic ranking into one list.
//!
//! Two strategies are implemented: weighted-normalized fusion (min-max
//! normalize each list, then blend by a weight `alpha`) and Reciprocal Rank
//! Fusion (score purely by rank position, ignoring the underlying scores'
//! scale entirely).

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bm25::BM25Hit;
use crate::semantic::SemanticHit;

/// Weight applied to the BM25 side of weighted-normalized fusion.
pub const DEFAULT_ALPHA: f32 = 0.5;

/// RRF's rank-damping constant.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Per-side diagnostics behind a fused score: the normalized (weighted
/// fusion) or raw (RRF) score and 1-based rank each side contributed,
/// `None` when the document didn't appear in that side's ranked list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionSubscores {
    pub bm25_score: Option<f32>,
    pub bm25_rank: Option<usize>,
    pub semantic_score: Option<f32>,
    pub semantic_rank: Option<usize>,
}

/// A document's fused score after combining BM25 and semantic rankings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedHit {
    pub id: u32,
    pub title: String,
    pub document: String,
    pub score: f32,
    pub subscores: FusionSubscores,
}

/// First-occurrence 1-based rank of each id in an already-ranked list.
fn rank_map(ids: impl Iterator<Item = u32>) -> HashMap<u32, usize> {
    let mut ranks = HashMap::new();
    for (idx, id) in ids.enumerate() {
        ranks.entry(id).or_insert(idx + 1);
    }
    ranks
}

fn title_map(bm25_hits: &[BM25Hit], semantic_hits: &[SemanticHit]) -> HashMap<u32, String> {
    let mut titles = HashMap::new();
    for hit in bm25_hits {
        titles.entry(hit.id).or_insert_with(|| hit.title.clone());
    }
    for hit in semantic_hits {
        titles.entry(hit.id).or_insert_with(|| hit.title.clone());
    }
    titles
}

fn document_map(bm25_hits: &[BM25Hit], semantic_hits: &[SemanticHit]) -> HashMap<u32, String> {
    let mut documents = HashMap::new();
    for hit in bm25_hits {
        documents.entry(hit.id).or_insert_with(|| hit.document.clone());
    }
    for hit in semantic_hits {
        documents.entry(hit.id).or_insert_with(|| hit.document.clone());
    }
    documents
}

/// Min-max normalize a list of `(doc_id, score)` pairs to `[0, 1]`.
///
/// When every score is equal (including a single-element list), every
/// document maps to `1.0` rather than dividing by a zero range.
pub fn min_max_normalize(scores: &[(u32, f32)]) -> HashMap<u32, f32> {
    if scores.is_empty() {
        return HashMap::new();
    }
    let min = scores.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let max = scores.iter().map(|(_, s)| *s).fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    scores
        .iter()
        .map(|(id, score)| {
            let normalized = if range.abs() < 1e-9 { 1.0 } else { (score - min) / range };
            (*id, normalized)
        })
        .collect()
}

/// Combine BM25 and semantic rankings by min-max normalizing each side and
/// blending with weight `alpha` (BM25 share; semantic gets `1 - alpha`).
///
/// Ties break on ascending document id.
pub fn weighted_fusion(
    bm25_hits: &[BM25Hit],
    semantic_hits: &[SemanticHit],
    alpha: f32,
    limit: usize,
) -> Vec<FusedHit> {
    let bm25_scores: Vec<(u32, f32)> = bm25_hits.iter().map(|h| (h.id, h.score)).collect();
    let semantic_scores: Vec<(u32, f32)> = semantic_hits.iter().map(|h| (h.id, h.score)).collect();

    let bm25_norm = min_max_normalize(&bm25_scores);
    let semantic_norm = min_max_normalize(&semantic_scores);
    let bm25_ranks = rank_map(bm25_hits.iter().map(|h| h.id));
    let semantic_ranks = rank_map(semantic_hits.iter().map(|h| h.id));
    let titles = title_map(bm25_hits, semantic_hits);
    let documents = document_map(bm25_hits, semantic_hits);

    let mut ids: Vec<u32> = bm25_norm.keys().chain(semantic_norm.keys()).copied().collect();
    ids.sort_unstable();
    ids.dedup();

    let mut fused: Vec<FusedHit> = ids
        .into_iter()
        .map(|id| {
            let bm25_score = bm25_norm.get(&id).copied().unwrap_or(0.0);
            let semantic_score = semantic_norm.get(&id).copied().unwrap_or(0.0);
            FusedHit {
                id,
                title: titles.get(&id).cloned().unwrap_or_default(),
                document: documents.get(&id).cloned().unwrap_or_default(),
                score: alpha * bm25_score + (1.0 - alpha) * semantic_score,
                subscores: FusionSubscores {
                    bm25_score: bm25_norm.get(&id).copied(),
                    bm25_rank: bm25_ranks.get(&id).copied(),
                    semantic_score: semantic_norm.get(&id).copied(),
                    semantic_rank: semantic_ranks.get(&id).copied(),
                },
            }
        })
        .collect();

    sort_fused(&mut fused);
    fused.truncate(limit);
    fused
}

/// Combine BM25 and semantic rankings by Reciprocal Rank Fusion:
/// `score(doc) = sum over lists containing doc of 1 / (k + rank)`, rank
/// counted from 1. A document's first occurrence in a list wins if it
/// somehow appears more than once; the exact order of ties within the
/// input lists doesn't affect the fused score, only rank position does.
pub fn rrf_fusion(bm25_hits: &[BM25Hit], semantic_hits: &[SemanticHit], k: f32, limit: usize) -> Vec<FusedHit> {
    let mut scores: HashMap<u32, f32> = HashMap::new();
    accumulate_rrf(&mut scores, bm25_hits.iter().map(|h| h.id), k);
    accumulate_rrf(&mut scores, semantic_hits.iter().map(|h| h.id), k);

    let bm25_ranks = rank_map(bm25_hits.iter().map(|h| h.id));
    let semantic_ranks = rank_map(semantic_hits.iter().map(|h| h.id));
    let bm25_raw: HashMap<u32, f32> = bm25_hits.iter().map(|h| (h.id, h.score)).collect();
    let semantic_raw: HashMap<u32, f32> = semantic_hits.iter().map(|h| (h.id, h.score)).collect();
    let titles = title_map(bm25_hits, semantic_hits);
    let documents = document_map(bm25_hits, semantic_hits);

    let mut fused: Vec<FusedHit> = scores
        .into_iter()
        .map(|(id, score)| FusedHit {
            id,
            title: titles.get(&id).cloned().unwrap_or_default(),
            document: documents.get(&id).cloned().unwrap_or_default(),
            score,
            subscores: FusionSubscores {
                bm25_score: bm25_raw.get(&id).copied(),
                bm25_rank: bm25_ranks.get(&id).copied(),
                semantic_score: semantic_raw.get(&id).copied(),
                semantic_rank: semantic_ranks.get(&id).copied(),
            },
        })
        .collect();

    sort_fused(&mut fused);
    fused.truncate(limit);
    fused
}

fn accumulate_rrf(scores: &mut HashMap<u32, f32>, ids: impl Iterator<Item = u32>, k: f32) {
    let mut seen = std::collections::HashSet::new();
    for (rank, id) in ids.enumerate() {
        if !seen.insert(id) {
            continue; // first occurrence wins
        }
        *scores.entry(id).or_insert(0.0) += 1.0 / (k + (rank + 1) as f32);
    }
}

fn sort_fused(fused: &mut [FusedHit]) {
    fused.sort_by(|a, b| match b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal) {
        Ordering::Equal => a.id.cmp(&b.id),
        other => other,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bm25_hits() -> Vec<BM25Hit> {
        vec![
            BM25Hit { id: 1, title: "Brave".to_string(), document: String::new(), score: 5.0 },
            BM25Hit { id: 2, title: "Paddington".to_string(), document: String::new(), score: 3.0 },
        ]
    }

    fn semantic_hits() -> Vec<SemanticHit> {
        vec![
            SemanticHit { id: 2, title: "Paddington".to_string(), document: String::new(), score: 0.9 },
            SemanticHit { id: 3, title: "The Revenant".to_string(), document: String::new(), score: 0.5 },
        ]
    }

    #[test]
    fn min_max_normalize_uniform_scores_all_become_one() {
        let normalized = min_max_normalize(&[(1, 4.0), (2, 4.0)]);
        assert_eq!(normalized[&1], 1.0);
        assert_eq!(normalized[&2], 1.0);
    }

    #[test]
    fn weighted_fusion_blends_both_sides() {
        let fused = weighted_fusion(&bm25_hits(), &semantic_hits(), 0.5, 10);
        let ids: Vec<u32> = fused.iter().map(|f| f.id).collect();
        assert_eq!(ids.len(), 3);
        // doc 2 appears strongly in both lists, should outrank doc 1 which
        // is BM25-only and doc 3 which is semantic-only.
        assert_eq!(fused[0].id, 2);
    }

    #[test]
    fn rrf_rewards_documents_present_in_both_lists() {
        let fused = rrf_fusion(&bm25_hits(), &semantic_hits(), DEFAULT_RRF_K, 10);
        assert_eq!(fused[0].id, 2);
    }

    #[test]
    fn rrf_score_matches_closed_form() {
        let fused = rrf_fusion(&bm25_hits(), &semantic_hits(), 60.0, 10);
        let doc2 = fused.iter().find(|f| f.id == 2).unwrap();
        // doc 2 is rank 2 in bm25 (1-indexed) and rank 1 in semantic.
        let expected = 1.0 / (60.0 + 2.0) + 1.0 / (60.0 + 1.0);
        assert!((doc2.score - expected).abs() < 1e-6);
    }
}
