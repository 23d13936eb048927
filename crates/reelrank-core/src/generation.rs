//! Retrieval-augmented generation: turning a ranked result set into an LLM
//! prompt and back into an answer. Prompt wording and answer quality are out
//! of scope for this engine; these functions exist to wire the retrieval
//! output into whatever [`LlmProvider`] the caller configured.

use crate::error::{EngineError, EngineResult};
use crate::fusion::FusedHit;
use crate::providers::LlmProvider;

fn documents_block(results: &[FusedHit]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("[{}] {}: {}", i + 1, hit.title, hit.document))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Answer a free-form query using the ranked results as context.
pub fn generate_rag_response(query: &str, results: &[FusedHit], llm: &dyn LlmProvider) -> EngineResult<String> {
    if results.is_empty() {
        return Err(EngineError::EmptyCorpus);
    }
    let prompt = format!(
        "Answer the query based on the documents below.\n\nQuery: {query}\n\nDocuments:\n{}\n\n\
         Provide a comprehensive answer that addresses the query:",
        documents_block(results)
    );
    llm.complete(&prompt)
}

/// Synthesize a short, information-dense summary across several results.
pub fn summarize(query: &str, results: &[FusedHit], llm: &dyn LlmProvider) -> EngineResult<String> {
    if results.is_empty() {
        return Err(EngineError::EmptyCorpus);
    }
    let prompt = format!(
        "Synthesize information from the search results below into a comprehensive \
         3-4 sentence answer.\n\nQuery: {query}\n\nSearch Results:\n{}",
        documents_block(results)
    );
    llm.complete(&prompt)
}

/// Answer with inline `[1]`, `[2]`, ... citations back to the result list.
pub fn cite(query: &str, results: &[FusedHit], llm: &dyn LlmProvider) -> EngineResult<String> {
    if results.is_empty() {
        return Err(EngineError::EmptyCorpus);
    }
    let prompt = format!(
        "Answer the query using the documents below, citing sources with [1], [2], etc. \
         If the answer isn't in the documents, say so.\n\nQuery: {query}\n\nDocuments:\n{}\n\nAnswer:",
        documents_block(results)
    );
    llm.complete(&prompt)
}

/// Answer a direct question conversationally, grounded in the result set.
pub fn answer_question(question: &str, results: &[FusedHit], llm: &dyn LlmProvider) -> EngineResult<String> {
    if results.is_empty() {
        return Err(EngineError::EmptyCorpus);
    }
    let prompt = format!(
        "Answer the question directly and conversationally, based on the documents below.\n\n\
         Question: {question}\n\nDocuments:\n{}\n\nAnswer:",
        documents_block(results)
    );
    llm.complete(&prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoLlm;
    impl LlmProvider for EchoLlm {
        fn complete(&self, prompt: &str) -> EngineResult<String> {
            Ok(format!("echo: {}", prompt.len()))
        }
    }

    fn results() -> Vec<FusedHit> {
        use crate::fusion::FusionSubscores;
        vec![FusedHit {
            id: 1,
            title: "Brave".to_string(),
            document: "A princess becomes an archer to change her fate.".to_string(),
            score: 1.0,
            subscores: FusionSubscores { bm25_score: None, bm25_rank: None, semantic_score: None, semantic_rank: None },
        }]
    }

    #[test]
    fn rag_response_rejects_empty_results() {
        let err = generate_rag_response("q", &[], &EchoLlm).unwrap_err();
        assert!(matches!(err, EngineError::EmptyCorpus));
    }

    #[test]
    fn summarize_calls_the_provider() {
        let out = summarize("bear movies", &results(), &EchoLlm).unwrap();
        assert!(out.starts_with("echo:"));
    }

    #[test]
    fn cite_calls_the_provider() {
        assert!(cite("bear movies", &results(), &EchoLlm).is_ok());
    }

    #[test]
    fn answer_question_calls_the_provider() {
        assert!(answer_question("any good bear movies?", &results(), &EchoLlm).is_ok());
    }
}
