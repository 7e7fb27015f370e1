//! Pseudo-relevance-feedback expansion
//!
//! Short or flat-scoring queries get expanded with terms mined from the top
//! BM25 candidates. The expanded candidate set only replaces the original
//! when its top-10 overlaps enough with the original top-10 (drift guard).

use super::fusion::stddev;
use kbfuse_common::text;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Terms with scores at most this low are never kept as expansions
const MIN_TERM_SCORE: f64 = 0.1;

/// Gate: expand when the query has at most four content tokens, or when the
/// initial top-10 normalized scores are nearly flat.
pub fn should_expand(query: &str, initial_scores: &[f64]) -> bool {
    let content_tokens = text::tokenize(query)
        .iter()
        .filter(|t| !text::is_stopword(t) && t.len() > 2)
        .count();
    if content_tokens <= 4 {
        return true;
    }
    if initial_scores.len() < 10 {
        return false;
    }
    stddev(&initial_scores[..10]) < 0.02
}

/// Mine expansion terms from feedback documents.
///
/// Each of the first `prf_k` documents contributes `weight * tf * idf_est`
/// per term, where the weight is the document's normalized score (negatives
/// mapped through `1/(1+|s|)`) and the idf estimate is banded by term
/// frequency. Stopwords, short terms, all-digit terms, and existing query
/// keywords are skipped. The first `prf_m` terms by score are kept, subject
/// to a minimum score; equal scores tie-break lexicographically.
pub fn expansion_terms(
    docs: &[(i64, &str, f64)],
    query_terms: &HashSet<String>,
    prf_k: usize,
    prf_m: usize,
) -> Vec<String> {
    let mut term_scores: HashMap<String, f64> = HashMap::new();

    for &(_, doc_text, score) in docs.iter().take(prf_k) {
        let doc_weight = if score < 0.0 {
            1.0 / (1.0 + score.abs())
        } else {
            score
        };

        let mut tf: HashMap<String, usize> = HashMap::new();
        for token in text::tokenize(doc_text) {
            *tf.entry(token).or_insert(0) += 1;
        }

        for (term, count) in tf {
            if term.len() < 3
                || text::is_stopword(&term)
                || text::is_all_digits(&term)
                || query_terms.contains(&term)
            {
                continue;
            }
            let idf_est = if count <= 2 {
                2.0
            } else if count <= 5 {
                1.5
            } else {
                1.0
            };
            *term_scores.entry(term).or_insert(0.0) += doc_weight * count as f64 * idf_est;
        }
    }

    let mut ranked: Vec<(String, f64)> = term_scores.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    ranked
        .into_iter()
        .take(prf_m)
        .filter(|(_, score)| *score > MIN_TERM_SCORE)
        .map(|(term, _)| term)
        .collect()
}

/// Fraction of the original top-10 chunk ids present in the expanded top-10.
/// The denominator is fixed at 10.
pub fn drift_overlap(original_ids: &[i64], expanded_ids: &[i64]) -> f64 {
    let original: HashSet<i64> = original_ids.iter().take(10).copied().collect();
    if original.is_empty() {
        return 0.0;
    }
    let expanded: HashSet<i64> = expanded_ids.iter().take(10).copied().collect();
    original.intersection(&expanded).count() as f64 / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_query_always_expands() {
        assert!(should_expand("mitochondria", &[]));
        assert!(should_expand("cellular energy production site", &[]));
    }

    #[test]
    fn test_flat_scores_expand() {
        let flat = vec![0.501, 0.502, 0.500, 0.501, 0.502, 0.500, 0.501, 0.502, 0.500, 0.501];
        assert!(should_expand(
            "alpha beta gamma delta epsilon zeta spread wide",
            &flat
        ));
    }

    #[test]
    fn test_long_query_with_spread_skips() {
        let spread = vec![0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2, 0.1, 0.05];
        assert!(!should_expand(
            "alpha beta gamma delta epsilon zeta spread wide",
            &spread
        ));
    }

    #[test]
    fn test_expansion_skips_query_and_stop_terms() {
        let docs = vec![
            (1, "mitochondria produce energy through oxidative respiration", 0.9),
            (2, "the respiration of mitochondria drives energy production", 0.8),
        ];
        let query_terms: HashSet<String> = ["mitochondria".to_string()].into_iter().collect();
        let terms = expansion_terms(&docs, &query_terms, 10, 20);

        assert!(terms.contains(&"respiration".to_string()));
        assert!(terms.contains(&"energy".to_string()));
        assert!(!terms.iter().any(|t| t == "mitochondria"));
        assert!(!terms.iter().any(|t| t == "the"));
    }

    #[test]
    fn test_negative_scores_use_reciprocal_weight() {
        let docs = vec![(1, "volcanic basalt formations", -3.0)];
        let query_terms = HashSet::new();
        // weight = 1/(1+3) = 0.25, tf = 1, idf = 2.0 -> 0.5 per term
        let terms = expansion_terms(&docs, &query_terms, 10, 20);
        assert_eq!(terms.len(), 3);
    }

    #[test]
    fn test_low_scoring_terms_dropped() {
        let docs = vec![(1, "faint signal", 0.01)];
        let query_terms = HashSet::new();
        // weight 0.01 * tf 1 * idf 2.0 = 0.02 <= 0.1
        let terms = expansion_terms(&docs, &query_terms, 10, 20);
        assert!(terms.is_empty());
    }

    #[test]
    fn test_drift_overlap_counts_over_ten() {
        let original = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let expanded = vec![1, 2, 3, 4, 99, 98, 97, 96, 95, 94];
        assert!((drift_overlap(&original, &expanded) - 0.4).abs() < 1e-12);

        let disjoint = vec![50, 51, 52];
        assert_eq!(drift_overlap(&original, &disjoint), 0.0);
        assert_eq!(drift_overlap(&[], &expanded), 0.0);
    }
}
