//! Catalog loading: the document set, the stopword list, and the golden
//! evaluation set, all read once per process from the on-disk corpus.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// An immutable catalog document: a movie with an id, title, and description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: u32,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    movies: Vec<RawMovie>,
}

#[derive(Debug, Deserialize)]
struct RawMovie {
    id: u32,
    title: String,
    #[serde(default)]
    description: Option<String>,
}

/// Load the movie catalog from a JSON file shaped `{"movies": [...]}`.
///
/// An absent `description` is treated as an empty string, per contract.
pub fn load_catalog(path: impl AsRef<Path>) -> EngineResult<Vec<Document>> {
    let raw = fs::read_to_string(path)?;
    let parsed: CatalogFile = serde_json::from_str(&raw)?;
    Ok(parsed
        .movies
        .into_iter()
        .map(|m| Document {
            id: m.id,
            title: m.title,
            description: m.description.unwrap_or_default(),
        })
        .collect())
}

/// Load the newline-delimited stopword list, lowercased, into a set.
pub fn load_stopwords(path: impl AsRef<Path>) -> EngineResult<HashSet<String>> {
    let raw = fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty())
        .collect())
}

/// A single golden-set test case: a query and the titles considered relevant.
#[derive(Debug, Clone, Deserialize)]
pub struct GoldenCase {
    pub query: String,
    pub relevant_docs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GoldenFile {
    test_cases: Vec<GoldenCase>,
}

/// Load the golden evaluation set: `{"test_cases": [{"query", "relevant_docs"}]}`.
pub fn load_golden_set(path: impl AsRef<Path>) -> EngineResult<Vec<GoldenCase>> {
    let raw = fs::read_to_string(path)?;
    let parsed: GoldenFile = serde_json::from_str(&raw)?;
    Ok(parsed.test_cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_catalog_defaults_missing_description() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"movies": [{{"id": 1, "title": "Brave"}}, {{"id": 2, "title": "Paddington", "description": "A bear in London"}}]}}"#
        )
        .unwrap();

        let docs = load_catalog(file.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].description, "");
        assert_eq!(docs[1].description, "A bear in London");
    }

    #[test]
    fn load_stopwords_lowercases_and_trims() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "The\nAnd\n\n  Of  ").unwrap();

        let stopwords = load_stopwords(file.path()).unwrap();
        assert!(stopwords.contains("the"));
        assert!(stopwords.contains("and"));
        assert!(stopwords.contains("of"));
        assert_eq!(stopwords.len(), 3);
    }

    #[test]
    fn load_golden_set_parses_test_cases() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"test_cases": [{{"query": "superhero team movie", "relevant_docs": ["Avengers"]}}]}}"#
        )
        .unwrap();

        let cases = load_golden_set(file.path()).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].query, "superhero team movie");
        assert_eq!(cases[0].relevant_docs, vec!["Avengers".to_string()]);
    }
}
