//! Evaluating retrieval quality against a golden set of (query, relevant
//! titles) pairs, using precision@k, recall@k, and F1.

use serde::{Deserialize, Serialize};

use crate::catalog::GoldenCase;
use crate::error::EngineResult;

/// Per-query evaluation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub query: String,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub retrieved: Vec<String>,
    pub relevant: Vec<String>,
}

/// Aggregate evaluation outcome across the whole golden set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub per_query: Vec<EvalResult>,
    pub mean_precision: f32,
    pub mean_recall: f32,
    pub mean_f1: f32,
}

fn normalized(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Fraction of the top-`k` retrieved titles that are relevant, out of `k`
/// (not the number actually retrieved — retrieving fewer than `k` documents
/// is itself a precision penalty).
pub fn precision_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f32 {
    if k == 0 {
        return 0.0;
    }
    let top_k: Vec<String> = retrieved.iter().take(k).map(|t| normalized(t)).collect();
    let relevant_set: std::collections::HashSet<String> = relevant.iter().map(|t| normalized(t)).collect();
    let hits = top_k.iter().filter(|t| relevant_set.contains(*t)).count();
    hits as f32 / k as f32
}

/// Fraction of all relevant titles found within the top-`k` retrieved.
pub fn recall_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f32 {
    if relevant.is_empty() {
        return 0.0;
    }
    let top_k: std::collections::HashSet<String> =
        retrieved.iter().take(k).map(|t| normalized(t)).collect();
    let hits = relevant.iter().filter(|t| top_k.contains(&normalized(t))).count();
    hits as f32 / relevant.len() as f32
}

/// Harmonic mean of precision and recall. `0.0` when both are `0.0`.
pub fn f1(precision: f32, recall: f32) -> f32 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Run each golden-set query through `search` (expected to be backed by
/// RRF fusion search) and score the retrieved titles against the golden
/// relevant set.
pub fn evaluate<F>(golden: &[GoldenCase], k: usize, mut search: F) -> EngineResult<EvalSummary>
where
    F: FnMut(&str, usize) -> EngineResult<Vec<String>>,
{
    let mut per_query = Vec::with_capacity(golden.len());
    for case in golden {
        let retrieved = search(&case.query, k)?;
        let precision = precision_at_k(&retrieved, &case.relevant_docs, k);
        let recall = recall_at_k(&retrieved, &case.relevant_docs, k);
        per_query.push(EvalResult {
            query: case.query.clone(),
            precision,
            recall,
            f1: f1(precision, recall),
            retrieved,
            relevant: case.relevant_docs.clone(),
        });
    }

    let n = per_query.len().max(1) as f32;
    let mean_precision = per_query.iter().map(|r| r.precision).sum::<f32>() / n;
    let mean_recall = per_query.iter().map(|r| r.recall).sum::<f32>() / n;
    let mean_f1 = per_query.iter().map(|r| r.f1).sum::<f32>() / n;

    Ok(EvalSummary { per_query, mean_precision, mean_recall, mean_f1 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_counts_relevant_among_retrieved() {
        let retrieved = vec!["Brave".to_string(), "Paddington".to_string(), "Cars".to_string()];
        let relevant = vec!["Brave".to_string(), "Cars".to_string()];
        assert!((precision_at_k(&retrieved, &relevant, 3) - (2.0 / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn recall_counts_relevant_found() {
        let retrieved = vec!["Brave".to_string()];
        let relevant = vec!["Brave".to_string(), "Cars".to_string()];
        assert!((recall_at_k(&retrieved, &relevant, 1) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn f1_is_zero_when_both_are_zero() {
        assert_eq!(f1(0.0, 0.0), 0.0);
    }

    #[test]
    fn title_matching_is_case_insensitive() {
        let retrieved = vec!["BRAVE".to_string()];
        let relevant = vec!["brave".to_string()];
        assert_eq!(precision_at_k(&retrieved, &relevant, 1), 1.0);
    }

    #[test]
    fn evaluate_aggregates_per_query_results() {
        let golden = vec![
            GoldenCase { query: "princess archer".to_string(), relevant_docs: vec!["Brave".to_string()] },
            GoldenCase { query: "bear london".to_string(), relevant_docs: vec!["Paddington".to_string()] },
        ];
        let summary = evaluate(&golden, 1, |query, _k| {
            Ok(if query.contains("princess") {
                vec!["Brave".to_string()]
            } else {
                vec!["Paddington".to_string()]
            })
        })
        .unwrap();
        assert_eq!(summary.mean_precision, 1.0);
        assert_eq!(summary.mean_recall, 1.0);
    }
}
