//! Sentence-window chunking for the semantic index.
//!
//! Splits a document into sentences, then slides a fixed-size window over
//! them with a configurable overlap so that a concept spanning a sentence
//! boundary still lands fully inside at least one chunk.

use regex::Regex;
use std::sync::OnceLock;

/// Chunking parameters. Defaults match the windows used to build the
/// reference semantic index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkParams {
    pub max_chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self { max_chunk_size: 4, overlap: 1 }
    }
}

fn sentence_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+\s+").unwrap())
}

/// Split free text into sentences on `.`/`!`/`?` followed by whitespace.
///
/// A text with no sentence-ending punctuation at all is returned as a
/// single sentence rather than dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    let mut last = 0;
    for m in sentence_boundary().find_iter(trimmed) {
        let punct_len = m.as_str().trim_end().len();
        let end = m.start() + punct_len;
        let sentence = trimmed[last..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        last = m.end();
    }
    let remainder = trimmed[last..].trim();
    if !remainder.is_empty() {
        sentences.push(remainder.to_string());
    }
    sentences
}

/// Slide a `max_chunk_size`-sentence window with `overlap` sentences shared
/// between consecutive chunks, joining each window's sentences with a space.
pub fn window_sentences(sentences: &[String], params: ChunkParams) -> Vec<String> {
    if sentences.is_empty() {
        return Vec::new();
    }
    let max_chunk_size = params.max_chunk_size.max(1);
    let step = max_chunk_size.saturating_sub(params.overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + max_chunk_size).min(sentences.len());
        chunks.push(sentences[start..end].join(" "));
        if end == sentences.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Convenience wrapper: split `text` into sentences, then window them.
pub fn chunk_text(text: &str, params: ChunkParams) -> Vec<String> {
    window_sentences(&split_sentences(text), params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        let sentences = split_sentences("One. Two! Three? Four.");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?", "Four."]);
    }

    #[test]
    fn single_unterminated_sentence_is_kept_whole() {
        let sentences = split_sentences("just one sentence with no terminal punctuation");
        assert_eq!(sentences, vec!["just one sentence with no terminal punctuation"]);
    }

    #[test]
    fn empty_text_yields_no_sentences() {
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn windows_with_overlap_match_reference_example() {
        let sentences = split_sentences("One. Two. Three. Four. Five.");
        let chunks = window_sentences(&sentences, ChunkParams { max_chunk_size: 2, overlap: 1 });
        assert_eq!(
            chunks,
            vec!["One. Two.", "Two. Three.", "Three. Four.", "Four. Five."]
        );
    }

    #[test]
    fn short_document_becomes_a_single_chunk() {
        let chunks = chunk_text("Only two sentences. Here.", ChunkParams::default());
        assert_eq!(chunks, vec!["Only two sentences. Here."]);
    }

    #[test]
    fn zero_overlap_windows_do_not_repeat_sentences() {
        let sentences = split_sentences("A. B. C. D.");
        let chunks = window_sentences(&sentences, ChunkParams { max_chunk_size: 2, overlap: 0 });
        assert_eq!(chunks, vec!["A. B.", "C. D."]);
    }
}
