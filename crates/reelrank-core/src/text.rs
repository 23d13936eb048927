//! Text normalization: lowercase, strip punctuation, tokenize, drop
//! stopwords, and apply Porter stemming.
//!
//! Every place that looks up a term in the index must run text through
//! [`normalize`] first — querying with a raw, unnormalized word is a contract
//! violation and will simply miss the postings.

use std::collections::HashSet;

use rust_stemmers::{Algorithm, Stemmer};

/// Normalize free text into a list of indexable terms.
///
/// Lowercases, strips ASCII punctuation, splits on whitespace, drops empty
/// tokens and stopwords, then stems each remaining token with the Porter
/// (Snowball English) algorithm. Terms are returned in original order;
/// duplicates are preserved (the caller decides whether to count them).
///
/// Deterministic and pure: identical input always produces identical output.
/// Empty input yields an empty list, not an error.
pub fn normalize(text: &str, stopwords: &HashSet<String>) -> Vec<String> {
    let stemmer = Stemmer::create(Algorithm::English);
    strip_punctuation(&text.to_lowercase())
        .split_whitespace()
        .filter(|tok| !tok.is_empty())
        .filter(|tok| !stopwords.contains(*tok))
        .map(|tok| stemmer.stem(tok).into_owned())
        .collect()
}

/// Characters shown in a result preview before truncation.
pub const DOCUMENT_PREVIEW_LIMIT: usize = 100;

/// Truncate `text` to [`DOCUMENT_PREVIEW_LIMIT`] characters for display in
/// search results.
pub fn preview(text: &str) -> String {
    if text.chars().count() <= DOCUMENT_PREVIEW_LIMIT {
        text.to_string()
    } else {
        text.chars().take(DOCUMENT_PREVIEW_LIMIT).collect()
    }
}

fn strip_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopwords(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let sw = stopwords(&[]);
        assert!(normalize("", &sw).is_empty());
    }

    #[test]
    fn lowercases_strips_punctuation_and_stems() {
        let sw = stopwords(&["the", "a"]);
        let terms = normalize("The Running Bears, Running!", &sw);
        // "running" stems to "run"; stopwords dropped; duplicates preserved.
        assert_eq!(terms, vec!["run", "bear", "run"]);
    }

    #[test]
    fn drops_stopwords_case_insensitively() {
        let sw = stopwords(&["of", "the"]);
        let terms = normalize("Lord Of The Rings", &sw);
        assert_eq!(terms, vec!["lord", "ring"]);
    }

    #[test]
    fn is_deterministic() {
        let sw = stopwords(&["a"]);
        let text = "A Quick Brown Fox";
        assert_eq!(normalize(text, &sw), normalize(text, &sw));
    }
}
