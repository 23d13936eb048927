//! Provider seams: embeddings, LLM completions, cross-encoder scoring, and
//! rate limiting.
//!
//! Every provider is a trait so the engine never hard-codes a vendor. Each
//! trait ships a deterministic, local, dependency-free default so the whole
//! engine is testable offline; an HTTP-backed implementation speaking the
//! OpenAI chat-completions wire format is available behind the
//! `http-providers` feature for anyone pointing `OPENAI_BASE_URL` at a real
//! endpoint or a local server such as Ollama or LM Studio.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::catalog::Document;
use crate::error::{EngineError, EngineResult};
use crate::text::normalize;

/// Produces fixed-dimension embedding vectors for a batch of texts,
/// preserving input order. Dimension is fixed per provider.
pub trait EmbeddingProvider: Send + Sync {
    fn encode(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>>;
    fn dim(&self) -> usize;

    /// Convenience wrapper for embedding a single string (e.g. a query).
    fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyQuery);
        }
        self.encode(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::ProviderError("encode returned no rows".to_string()))
    }
}

/// A single free-form LLM completion, used for RAG answer synthesis and
/// LLM-based re-ranking.
pub trait LlmProvider: Send + Sync {
    fn complete(&self, prompt: &str) -> EngineResult<String>;
}

/// Scores a batch of `(query, document)` pairs directly, without an
/// intermediate embedding, preserving input order. Scores are raw and
/// unnormalized; larger is more relevant.
pub trait CrossEncoderProvider: Send + Sync {
    fn predict(&self, pairs: &[(String, String)]) -> EngineResult<Vec<f32>>;
}

/// Throttles outbound provider calls. `acquire` blocks (or errors) until
/// the caller may proceed.
pub trait RateLimiter: Send + Sync {
    fn acquire(&self) -> EngineResult<()>;
}

/// A rate limiter that never waits. The right default for local providers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpRateLimiter;

impl RateLimiter for NoOpRateLimiter {
    fn acquire(&self) -> EngineResult<()> {
        Ok(())
    }
}

/// A simple fixed-window token bucket, one permit per `interval`. Intended
/// for HTTP-backed providers where the remote side enforces a quota.
pub struct SimpleRateLimiter {
    interval: Duration,
    last: Mutex<Instant>,
}

impl SimpleRateLimiter {
    pub fn new(permits_per_second: f64) -> Self {
        let interval = Duration::from_secs_f64(1.0 / permits_per_second.max(0.001));
        Self { interval, last: Mutex::new(Instant::now() - interval) }
    }
}

impl RateLimiter for SimpleRateLimiter {
    fn acquire(&self) -> EngineResult<()> {
        let mut last = self.last.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let elapsed = now.duration_since(*last);
        if elapsed < self.interval {
            std::thread::sleep(self.interval - elapsed);
        }
        *last = Instant::now();
        Ok(())
    }
}

/// Deterministic feature-hashing embedding provider.
///
/// Hashes each normalized term into one of `dim` buckets and accumulates a
/// count there, then L2-normalizes. Not semantically meaningful in the way a
/// trained model is, but stable, dependency-free, and good enough to drive
/// the semantic-search machinery in tests and offline use.
pub struct HashingEmbeddingProvider {
    dim: usize,
    stopwords: Arc<HashSet<String>>,
}

impl HashingEmbeddingProvider {
    pub fn new(dim: usize, stopwords: Arc<HashSet<String>>) -> Self {
        Self { dim: dim.max(1), stopwords }
    }
}

impl EmbeddingProvider for HashingEmbeddingProvider {
    fn encode(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dim];
                for term in normalize(text, &self.stopwords) {
                    let bucket = fnv1a(term.as_bytes()) as usize % self.dim;
                    vector[bucket] += 1.0;
                }
                let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for v in &mut vector {
                        *v /= norm;
                    }
                }
                Ok(vector)
            })
            .collect()
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Deterministic keyword-overlap cross-encoder: the count of stemmed terms
/// shared between query and document. Raw, unnormalized, larger-is-better,
/// same cascade-style heuristic used to pre-filter before a real model.
pub struct HeuristicCrossEncoder {
    stopwords: Arc<HashSet<String>>,
}

impl HeuristicCrossEncoder {
    pub fn new(stopwords: Arc<HashSet<String>>) -> Self {
        Self { stopwords }
    }
}

impl CrossEncoderProvider for HeuristicCrossEncoder {
    fn predict(&self, pairs: &[(String, String)]) -> EngineResult<Vec<f32>> {
        pairs
            .iter()
            .map(|(query, document)| {
                let query_terms: HashSet<String> = normalize(query, &self.stopwords).into_iter().collect();
                if query_terms.is_empty() {
                    return Err(EngineError::EmptyQuery);
                }
                let doc_terms: HashSet<String> = normalize(document, &self.stopwords).into_iter().collect();
                Ok(query_terms.intersection(&doc_terms).count() as f32)
            })
            .collect()
    }
}

/// Deterministic local LLM stand-in used for individual and batch
/// re-ranking when no real provider is configured. Scores and orders
/// candidates by normalized keyword overlap rather than calling out to a
/// model; exists so the rerank pipeline is exercisable offline.
pub struct LocalHeuristicLlm {
    stopwords: Arc<HashSet<String>>,
}

impl LocalHeuristicLlm {
    pub fn new(stopwords: Arc<HashSet<String>>) -> Self {
        Self { stopwords }
    }

    /// Score `document` against `query` on a 0-10 integer scale, the shape
    /// expected from the individual LLM rerank prompt.
    pub fn score_individual(&self, query: &str, document: &str) -> u32 {
        let query_terms: HashSet<String> = normalize(query, &self.stopwords).into_iter().collect();
        if query_terms.is_empty() {
            return 0;
        }
        let doc_terms: HashSet<String> = normalize(document, &self.stopwords).into_iter().collect();
        let overlap = query_terms.intersection(&doc_terms).count();
        (overlap * 10 / query_terms.len().max(1)).min(10) as u32
    }

    /// Order `documents` by the same heuristic, the shape expected from the
    /// batch LLM rerank prompt (an ordered list of document ids).
    pub fn order_batch(&self, query: &str, documents: &[Document]) -> Vec<u32> {
        let mut scored: Vec<(u32, u32)> = documents
            .iter()
            .map(|doc| {
                let text = format!("{} {}", doc.title, doc.description);
                (doc.id, self.score_individual(query, &text))
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.into_iter().map(|(id, _)| id).collect()
    }
}

impl LlmProvider for LocalHeuristicLlm {
    fn complete(&self, prompt: &str) -> EngineResult<String> {
        if prompt.trim().is_empty() {
            return Err(EngineError::EmptyQuery);
        }
        Ok(format!(
            "[local heuristic summary: {} term(s) of context]",
            normalize(prompt, &self.stopwords).len()
        ))
    }
}

/// The subset of LLM behavior the re-ranker depends on: scoring one
/// document at a time, or ordering a whole batch from a single prompt.
pub trait LlmRanker: Send + Sync {
    fn score_individual(&self, query: &str, document: &str) -> EngineResult<u32>;
    fn order_batch(&self, query: &str, documents: &[Document]) -> EngineResult<Vec<u32>>;
}

impl LlmRanker for LocalHeuristicLlm {
    fn score_individual(&self, query: &str, document: &str) -> EngineResult<u32> {
        Ok(LocalHeuristicLlm::score_individual(self, query, document))
    }

    fn order_batch(&self, query: &str, documents: &[Document]) -> EngineResult<Vec<u32>> {
        Ok(LocalHeuristicLlm::order_batch(self, query, documents))
    }
}

/// Drives any [`LlmProvider`] through the individual and batch re-rank
/// prompts, parsing its free-text completions back into scores and
/// orderings. A malformed individual-score reply is the caller's problem
/// (non-fatal, demoted to zero); a malformed batch reply fails the whole
/// call, since there's no partial ordering to recover.
pub struct PromptLlmRanker<P: LlmProvider> {
    provider: P,
}

impl<P: LlmProvider> PromptLlmRanker<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: LlmProvider> LlmRanker for PromptLlmRanker<P> {
    fn score_individual(&self, query: &str, document: &str) -> EngineResult<u32> {
        let prompt = format!(
            "Rate how relevant this document is to the query on a scale of 0 to 10. \
             Respond with only the integer.\n\nQuery: {query}\nDocument: {document}"
        );
        let reply = self.provider.complete(&prompt)?;
        reply
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse::<u32>()
            .map(|n| n.min(10))
            .map_err(|_| EngineError::ProviderError(format!("could not parse LLM score from {reply:?}")))
    }

    fn order_batch(&self, query: &str, documents: &[Document]) -> EngineResult<Vec<u32>> {
        let listing = documents
            .iter()
            .map(|d| format!("id={} title={}", d.id, d.title))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Given the query, order these documents by relevance, most relevant first. \
             Respond with only a JSON array of ids.\n\nQuery: {query}\nDocuments:\n{listing}"
        );
        let reply = self.provider.complete(&prompt)?;
        let ids: Vec<u32> = serde_json::from_str(reply.trim())
            .map_err(|e| EngineError::RerankFailure(format!("batch rerank reply was not a JSON id array: {e}")))?;
        Ok(ids)
    }
}

#[cfg(feature = "http-providers")]
pub mod http {
    //! OpenAI-chat-completions-compatible HTTP client, configured via
    //! `OPENAI_API_KEY` and `OPENAI_BASE_URL`. Pointing `OPENAI_BASE_URL` at
    //! a local server (Ollama, LM Studio) gets the same code path without a
    //! real API key requirement on the remote end.

    use super::*;
    use serde::Deserialize;
    use std::env;

    const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

    pub struct OpenAiClient {
        api_key: String,
        base_url: String,
        model: String,
        client: reqwest::blocking::Client,
        rate_limiter: Arc<dyn RateLimiter>,
    }

    impl OpenAiClient {
        /// Build a client from `OPENAI_API_KEY` / `OPENAI_BASE_URL`.
        /// Fails with [`EngineError::ProviderError`] if no API key is set.
        pub fn from_env(model: impl Into<String>, rate_limiter: Arc<dyn RateLimiter>) -> EngineResult<Self> {
            let api_key = env::var("OPENAI_API_KEY")
                .map_err(|_| EngineError::ProviderError("OPENAI_API_KEY is not set".to_string()))?;
            let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
            Ok(Self {
                api_key,
                base_url,
                model: model.into(),
                client: reqwest::blocking::Client::new(),
                rate_limiter,
            })
        }

        fn chat(&self, messages: serde_json::Value) -> EngineResult<String> {
            self.rate_limiter.acquire()?;
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({ "model": self.model, "messages": messages }))
                .send()
                .map_err(|e| EngineError::ProviderError(e.to_string()))?;

            if !response.status().is_success() {
                return Err(EngineError::ProviderError(format!(
                    "chat completion returned status {}",
                    response.status()
                )));
            }

            #[derive(Deserialize)]
            struct ChatResponse {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: Message,
            }
            #[derive(Deserialize)]
            struct Message {
                content: String,
            }

            let parsed: ChatResponse = response
                .json()
                .map_err(|e| EngineError::ProviderError(e.to_string()))?;
            parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| EngineError::ProviderError("empty choices array".to_string()))
        }
    }

    impl LlmProvider for OpenAiClient {
        fn complete(&self, prompt: &str) -> EngineResult<String> {
            self.chat(serde_json::json!([{ "role": "user", "content": prompt }]))
        }
    }

    pub struct OpenAiEmbeddingClient {
        api_key: String,
        base_url: String,
        model: String,
        dim: usize,
        client: reqwest::blocking::Client,
        rate_limiter: Arc<dyn RateLimiter>,
    }

    impl OpenAiEmbeddingClient {
        pub fn from_env(
            model: impl Into<String>,
            dim: usize,
            rate_limiter: Arc<dyn RateLimiter>,
        ) -> EngineResult<Self> {
            let api_key = env::var("OPENAI_API_KEY")
                .map_err(|_| EngineError::ProviderError("OPENAI_API_KEY is not set".to_string()))?;
            let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
            Ok(Self {
                api_key,
                base_url,
                model: model.into(),
                dim,
                client: reqwest::blocking::Client::new(),
                rate_limiter,
            })
        }
    }

    impl EmbeddingProvider for OpenAiEmbeddingClient {
        fn encode(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            self.rate_limiter.acquire()?;
            let response = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({ "model": self.model, "input": texts }))
                .send()
                .map_err(|e| EngineError::ProviderError(e.to_string()))?;

            if !response.status().is_success() {
                return Err(EngineError::ProviderError(format!(
                    "embeddings endpoint returned status {}",
                    response.status()
                )));
            }

            #[derive(Deserialize)]
            struct EmbeddingResponse {
                data: Vec<EmbeddingData>,
            }
            #[derive(Deserialize)]
            struct EmbeddingData {
                embedding: Vec<f32>,
            }

            let parsed: EmbeddingResponse = response
                .json()
                .map_err(|e| EngineError::ProviderError(e.to_string()))?;
            if parsed.data.len() != texts.len() {
                return Err(EngineError::ProviderError(format!(
                    "embeddings endpoint returned {} rows for {} inputs",
                    parsed.data.len(),
                    texts.len()
                )));
            }
            Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
        }

        fn dim(&self) -> usize {
            self.dim
        }
    }
}
