//! Error types for the retrieval engine.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur while building, loading, or querying the engine.
#[derive(Debug)]
pub enum EngineError {
    /// Normalized query has zero terms (BM25) or zero length (embedding).
    EmptyQuery,
    /// Build was attempted against an empty document set.
    EmptyCorpus,
    /// A required cache artifact is missing on disk.
    CacheMissing(PathBuf),
    /// A cache artifact exists but fails version/shape validation.
    CacheStale(String),
    /// Caller requested a re-rank strategy the engine doesn't recognize.
    UnknownRerankMethod(String),
    /// LLM or cross-encoder returned malformed output that can't be recovered from.
    RerankFailure(String),
    /// Upstream embedding/LLM/cross-encoder provider error.
    ProviderError(String),
    /// I/O error reading catalog, stopwords, golden-set, or cache files.
    Io(std::io::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyQuery => write!(f, "query is empty"),
            Self::EmptyCorpus => write!(f, "cannot build an index over an empty document set"),
            Self::CacheMissing(path) => write!(f, "cache artifact missing: {}", path.display()),
            Self::CacheStale(reason) => write!(f, "cache is stale: {}", reason),
            Self::UnknownRerankMethod(name) => write!(f, "unknown rerank method: {}", name),
            Self::RerankFailure(reason) => write!(f, "rerank failed: {}", reason),
            Self::ProviderError(kind) => write!(f, "provider error: {}", kind),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<postcard::Error> for EngineError {
    fn from(e: postcard::Error) -> Self {
        Self::CacheStale(format!("postcard decode error: {}", e))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::CacheStale(format!("json decode error: {}", e))
    }
}

/// Result type used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;
