//! Score fusion and co-mention boosting
//!
//! Combines the BM25 and embedding rankings with reciprocal-rank fusion.
//! The embedding side is weighted by how informative the cosine
//! distribution is, and the fused score is multiplied by a boost from
//! lexical overlap, phrase matches, and shared digits.

use kbfuse_common::text;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Min-max scale values into [0, 1]; a degenerate range maps to all 0.5.
pub fn minmax(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if hi - lo < 1e-9 {
        return vec![0.5; values.len()];
    }
    values.iter().map(|v| (v - lo) / (hi - lo)).collect()
}

/// Population standard deviation.
pub fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Weight applied to normalized embedding scores before ranking.
///
/// A spread-out cosine distribution earns the embedding side more weight;
/// the result stays within [0.6, 1.0].
pub fn embedding_weight(raw_sims: &[f64]) -> f64 {
    let sigma = stddev(raw_sims);
    let w = 1.0 / (1.0 + (-(sigma - 0.008) / 0.004).exp());
    0.6 + 0.4 * w
}

/// Reciprocal-rank fusion of the BM25 ordering (candidate index) and the
/// weighted-embedding ordering.
pub fn rrf_scores(weighted_embed: &[f64], rrf_k: usize) -> Vec<f64> {
    let count = weighted_embed.len();

    let mut by_embed: Vec<usize> = (0..count).collect();
    by_embed.sort_by(|&a, &b| {
        weighted_embed[b]
            .partial_cmp(&weighted_embed[a])
            .unwrap_or(Ordering::Equal)
    });
    let mut embed_rank = vec![0usize; count];
    for (rank, &idx) in by_embed.iter().enumerate() {
        embed_rank[idx] = rank;
    }

    (0..count)
        .map(|bm25_rank| {
            1.0 / ((rrf_k + bm25_rank) as f64) + 1.0 / ((rrf_k + embed_rank[bm25_rank]) as f64)
        })
        .collect()
}

/// Per-candidate boost features, each min-max scaled.
#[derive(Debug, Clone)]
pub struct BoostFeatures {
    pub jaccard: Vec<f64>,
    pub phrase: Vec<f64>,
    pub digit: Vec<f64>,
}

fn digit_runs(tokens: &[String]) -> HashSet<String> {
    let mut runs = HashSet::new();
    for token in tokens {
        let mut current = String::new();
        for c in token.chars() {
            if c.is_ascii_digit() {
                current.push(c);
            } else if !current.is_empty() {
                runs.insert(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            runs.insert(current);
        }
    }
    runs
}

fn feature_scale(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    values.iter().map(|v| (v - lo) / ((hi - lo) + 1e-9)).collect()
}

/// Compute boost features for each candidate text against the query.
pub fn boost_features(texts: &[&str], query: &str) -> BoostFeatures {
    let query_tokens: Vec<String> = text::tokenize(query)
        .into_iter()
        .filter(|t| !text::is_stopword(t))
        .collect();
    let query_set: HashSet<&str> = query_tokens.iter().map(|t| t.as_str()).collect();
    let query_digits = digit_runs(&query_tokens);

    let mut phrases: HashSet<String> = HashSet::new();
    for n in [2usize, 3] {
        if query_tokens.len() >= n {
            for window in query_tokens.windows(n) {
                phrases.insert(window.join(" "));
            }
        }
    }
    let phrase_count = phrases.len().max(1);

    let mut jaccard = Vec::with_capacity(texts.len());
    let mut phrase = Vec::with_capacity(texts.len());
    let mut digit = Vec::with_capacity(texts.len());

    for &candidate in texts {
        let tokens = text::tokenize(candidate);
        let joined = tokens.join(" ");
        let token_set: HashSet<&str> = tokens.iter().map(|t| t.as_str()).collect();

        let intersection = query_set.intersection(&token_set).count();
        let union = query_set.union(&token_set).count();
        jaccard.push(intersection as f64 / union.max(1) as f64);

        let matched = phrases.iter().filter(|p| joined.contains(p.as_str())).count();
        phrase.push(matched as f64 / phrase_count as f64);

        let candidate_digits = digit_runs(&tokens);
        digit.push(if query_digits.is_empty() || query_digits.is_disjoint(&candidate_digits) {
            0.0
        } else {
            1.0
        });
    }

    BoostFeatures {
        jaccard: feature_scale(&jaccard),
        phrase: feature_scale(&phrase),
        digit: feature_scale(&digit),
    }
}

/// Multiply fused scores by the co-mention boost.
pub fn apply_boost(rrf: &[f64], features: &BoostFeatures) -> Vec<f64> {
    rrf.iter()
        .enumerate()
        .map(|(i, base)| {
            let co_mention = 0.4 * features.jaccard[i] + 0.3 * features.phrase[i] + 0.1 * features.digit[i];
            base * (1.0 + co_mention)
        })
        .collect()
}
