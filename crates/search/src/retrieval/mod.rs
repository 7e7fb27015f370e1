//! Retrieval pipeline stages
//!
//! One module per stage:
//! - `prf`: pseudo-relevance-feedback expansion with a drift guard
//! - `dedup`: Jaccard near-duplicate suppression
//! - `budget`: adaptive rerank-pool depth selection
//! - `fusion`: score normalization, RRF, and co-mention boosts
//! - `mmr`: vector maximal-marginal-relevance diversification

pub mod budget;
pub mod dedup;
pub mod fusion;
pub mod mmr;
pub mod prf;

use serde::{Deserialize, Serialize};

/// Pipeline stage that produced a result set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RankStage {
    /// Lexical-only results (numeric shortcut)
    #[serde(rename = "S1")]
    Lexical,

    /// Lexical-only results after an embedding failure
    #[serde(rename = "S1_embed_fail")]
    LexicalEmbedFail,

    /// Fused lexical + embedding results
    #[serde(rename = "S3")]
    Fused,

    /// Fused results after MMR diversification
    #[serde(rename = "S3_MMR")]
    FusedDiversified,
}

impl RankStage {
    /// Wire tag for this stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            RankStage::Lexical => "S1",
            RankStage::LexicalEmbedFail => "S1_embed_fail",
            RankStage::Fused => "S3",
            RankStage::FusedDiversified => "S3_MMR",
        }
    }
}

/// One returned passage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Uid of the file the passage belongs to
    pub file_uid: String,

    /// Path the caller searched
    pub file_path: String,

    /// Chunk identifier within the index
    pub chunk_id: i64,

    /// Final relevance score (stage-dependent scale)
    pub score: f64,

    /// Query-focused snippet of the chunk text
    pub snippet: String,

    /// Stage that produced this result
    pub rank_stage: RankStage,
}

/// Candidate passage flowing through the pipeline
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk_id: i64,
    pub text: String,
    pub text_hash: [u8; 16],
    /// Normalized BM25 score, `1/(1+raw)` then min-max scaled
    pub bm25_norm: f64,
}
