//! `reelrank` — build and query the hybrid retrieval engine from the
//! command line. All argument parsing, provider wiring, and output
//! formatting lives here; `reelrank-core` never touches stdout directly.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use reelrank_core::prelude::*;
use reelrank_core::providers::{HashingEmbeddingProvider, LocalHeuristicLlm};
use reelrank_core::{Engine, DEFAULT_WEIGHTED_ALPHA, SEARCH_OVERSAMPLE};

#[derive(Parser)]
#[command(name = "reelrank", author, version, about = "Hybrid lexical + semantic movie search", long_about = None)]
struct Cli {
    /// Directory holding (or to hold) the built index cache.
    #[arg(long, global = true, default_value = "./cache")]
    cache_dir: PathBuf,

    /// Newline-delimited stopword list.
    #[arg(long, global = true, default_value = "./data/stopwords.txt")]
    stopwords: PathBuf,

    /// Embedding dimensionality for the local hashing embedding provider.
    #[arg(long, global = true, default_value_t = 128)]
    embedding_dim: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the inverted index and semantic index from a catalog file.
    Build {
        /// JSON catalog file: `{"movies": [{"id", "title", "description"}]}`.
        catalog: PathBuf,
    },
    /// Fused search using engine defaults (RRF).
    Search { query: String, #[arg(long, default_value_t = 10)] limit: usize },
    /// Lexical-only BM25 search.
    Bm25Search { query: String, #[arg(long, default_value_t = 10)] limit: usize },
    /// Weighted-normalized fusion search.
    WeightedSearch {
        query: String,
        #[arg(long, default_value_t = DEFAULT_WEIGHTED_ALPHA)]
        alpha: f32,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Reciprocal Rank Fusion search.
    RrfSearch {
        query: String,
        #[arg(long, default_value_t = 60.0)]
        k: f32,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Retrieval-augmented answer to a free-form query.
    Rag {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long, value_enum, default_value = "local")]
        llm: CliLlmChoice,
    },
    /// Information-dense summary across the top results.
    Summarize {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long, value_enum, default_value = "local")]
        llm: CliLlmChoice,
    },
    /// Answer with inline [1], [2], ... citations.
    Citations {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long, value_enum, default_value = "local")]
        llm: CliLlmChoice,
    },
    /// Conversational answer to a direct question.
    Question {
        question: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long, value_enum, default_value = "local")]
        llm: CliLlmChoice,
    },
    /// Score precision@k / recall@k / F1 against a golden set.
    Evaluate {
        golden_set: PathBuf,
        #[arg(long, default_value_t = 10)]
        k: usize,
    },
    /// Raw term frequency of `term` in document `doc_id`.
    Tf { doc_id: u32, term: String },
    /// Smoothed inverse document frequency of `term`.
    Idf { term: String },
    /// Classic TF-IDF of `term` in document `doc_id`.
    Tfidf { doc_id: u32, term: String },
    /// BM25's own IDF variant for `term`.
    Bm25Idf { term: String },
    /// BM25's length-normalized term frequency for `term` in `doc_id`.
    Bm25Tf { doc_id: u32, term: String },
    /// Run text normalization (lowercase, strip punctuation, stem, drop stopwords).
    Normalize { text: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum CliLlmChoice {
    Local,
    #[cfg(feature = "http-providers")]
    Openai,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let stopwords: Arc<HashSet<String>> = Arc::new(load_stopwords(&cli.stopwords).context("loading stopwords")?);
    let embedder = HashingEmbeddingProvider::new(cli.embedding_dim, stopwords.clone());

    match cli.command {
        Commands::Build { catalog } => {
            let documents = load_catalog(&catalog).context("loading catalog")?;
            let engine = Engine::build(
                &documents,
                stopwords,
                &embedder,
                Bm25Params::default(),
                ChunkParams::default(),
            )
            .context("building engine")?;
            engine.save(&cli.cache_dir).context("saving cache")?;
            println!("Built index over {} documents into {}", documents.len(), cli.cache_dir.display());
        }
        Commands::Search { query, limit } => {
            let engine = load_engine(&cli.cache_dir, stopwords)?;
            print_fused(&engine.search(&query, limit, &embedder)?);
        }
        Commands::Bm25Search { query, limit } => {
            let engine = load_engine(&cli.cache_dir, stopwords)?;
            for hit in engine.bm25_search(&query, limit)? {
                println!("{:>8.4}  {}", hit.score, hit.title);
            }
        }
        Commands::WeightedSearch { query, alpha, limit } => {
            let engine = load_engine(&cli.cache_dir, stopwords)?;
            print_fused(&engine.weighted_search(&query, alpha, limit, &embedder)?);
        }
        Commands::RrfSearch { query, k, limit } => {
            let engine = load_engine(&cli.cache_dir, stopwords)?;
            print_fused(&engine.rrf_search(&query, k, limit, &embedder)?);
        }
        Commands::Rag { query, limit, llm } => {
            let engine = load_engine(&cli.cache_dir, stopwords.clone())?;
            let results = engine.search(&query, limit * SEARCH_OVERSAMPLE, &embedder)?;
            let provider = build_llm_provider(llm, stopwords)?;
            println!("{}", reelrank_core::generation::generate_rag_response(&query, &results, provider.as_ref())?);
        }
        Commands::Summarize { query, limit, llm } => {
            let engine = load_engine(&cli.cache_dir, stopwords.clone())?;
            let results = engine.search(&query, limit * SEARCH_OVERSAMPLE, &embedder)?;
            let provider = build_llm_provider(llm, stopwords)?;
            println!("{}", reelrank_core::generation::summarize(&query, &results, provider.as_ref())?);
        }
        Commands::Citations { query, limit, llm } => {
            let engine = load_engine(&cli.cache_dir, stopwords.clone())?;
            let results = engine.search(&query, limit * SEARCH_OVERSAMPLE, &embedder)?;
            let provider = build_llm_provider(llm, stopwords)?;
            println!("{}", reelrank_core::generation::cite(&query, &results, provider.as_ref())?);
        }
        Commands::Question { question, limit, llm } => {
            let engine = load_engine(&cli.cache_dir, stopwords.clone())?;
            let results = engine.search(&question, limit * SEARCH_OVERSAMPLE, &embedder)?;
            let provider = build_llm_provider(llm, stopwords)?;
            println!("{}", reelrank_core::generation::answer_question(&question, &results, provider.as_ref())?);
        }
        Commands::Evaluate { golden_set, k } => {
            let engine = load_engine(&cli.cache_dir, stopwords)?;
            let golden = load_golden_set(&golden_set).context("loading golden set")?;
            let summary = evaluate(&golden, k, |query, limit| {
                Ok(engine.search(query, limit, &embedder)?.into_iter().map(|h| h.title).collect())
            })?;
            for result in &summary.per_query {
                println!(
                    "{:<40} precision={:.2} recall={:.2} f1={:.2}",
                    result.query, result.precision, result.recall, result.f1
                );
            }
            println!(
                "mean precision={:.3} recall={:.3} f1={:.3}",
                summary.mean_precision, summary.mean_recall, summary.mean_f1
            );
        }
        Commands::Tf { doc_id, term } => {
            let engine = load_engine(&cli.cache_dir, stopwords)?;
            println!("{}", engine.inverted_index().tf(doc_id, &term));
        }
        Commands::Idf { term } => {
            let engine = load_engine(&cli.cache_dir, stopwords)?;
            println!("{}", engine.inverted_index().idf(&term));
        }
        Commands::Tfidf { doc_id, term } => {
            let engine = load_engine(&cli.cache_dir, stopwords)?;
            println!("{}", engine.inverted_index().tfidf(doc_id, &term));
        }
        Commands::Bm25Idf { term } => {
            let engine = load_engine(&cli.cache_dir, stopwords)?;
            println!("{}", engine.inverted_index().bm25_idf(&term));
        }
        Commands::Bm25Tf { doc_id, term } => {
            let engine = load_engine(&cli.cache_dir, stopwords)?;
            println!("{}", engine.inverted_index().bm25_tf(doc_id, &term));
        }
        Commands::Normalize { text } => {
            let terms = reelrank_core::text::normalize(&text, &stopwords);
            println!("{}", terms.join(" "));
        }
    }

    Ok(())
}

fn load_engine(cache_dir: &PathBuf, stopwords: Arc<HashSet<String>>) -> Result<Engine> {
    Engine::load(cache_dir, stopwords, Bm25Params::default())
        .with_context(|| format!("loading cached index from {}", cache_dir.display()))
}

fn print_fused(hits: &[FusedHit]) {
    for hit in hits {
        println!("{:>8.4}  {}", hit.score, hit.title);
    }
}

fn build_llm_provider(choice: CliLlmChoice, stopwords: Arc<HashSet<String>>) -> Result<Box<dyn LlmProvider>> {
    match choice {
        CliLlmChoice::Local => Ok(Box::new(LocalHeuristicLlm::new(stopwords))),
        #[cfg(feature = "http-providers")]
        CliLlmChoice::Openai => {
            let limiter: Arc<dyn RateLimiter> = Arc::new(NoOpRateLimiter);
            let client = reelrank_core::providers::http::OpenAiClient::from_env("gpt-4o-mini", limiter)?;
            Ok(Box::new(client))
        }
    }
}
