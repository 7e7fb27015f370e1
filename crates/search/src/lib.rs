//! KBFuse search engine
//!
//! Per-file hybrid retrieval: a free-form query against a previously indexed
//! text file returns a short ranked list of passage snippets. Lexical BM25
//! candidates from the full-text index are optionally expanded with
//! pseudo-relevance feedback, deduplicated, reranked against embedding
//! cosine similarity, fused with reciprocal-rank fusion plus co-mention
//! boosts, and diversified with vector MMR when coverage allows.
//!
//! The engine degrades gracefully: when the embedding service is slow or
//! down, queries fall back to BM25-only results and tag them accordingly.

pub mod engine;
pub mod fts;
pub mod retrieval;
pub mod store;

pub use engine::SearchEngine;
pub use retrieval::{RankStage, SearchHit};
pub use store::Store;

/// Maximum keyword terms extracted from a query
pub const MAX_QUERY_TERMS: usize = 16;

/// Anchor terms carried into an expanded query
pub const MAX_ANCHOR_TERMS: usize = 3;

/// Expansion terms carried into an expanded query
pub const MAX_EXPANSION_TERMS: usize = 5;

/// Minimum top-10 overlap for an expanded candidate set to replace the original
pub const PRF_DRIFT_MIN_OVERLAP: f64 = 0.4;

/// Minimum fraction of candidates with nonzero cosine for MMR to run
pub const MMR_MIN_VECTOR_COVERAGE: f64 = 0.90;

/// Relevance/diversity balance used by MMR
pub const MMR_LAMBDA: f64 = 0.7;
