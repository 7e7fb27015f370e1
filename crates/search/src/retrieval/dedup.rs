//! Near-duplicate suppression
//!
//! Filters candidates whose token sets are almost identical to an already
//! kept candidate, processing in decreasing score order.

use kbfuse_common::text;
use std::cmp::Ordering;
use std::collections::HashSet;

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union.max(1) as f64
}

/// Return the indices to keep, in decreasing score order.
///
/// A candidate is kept iff its token-set Jaccard similarity against every
/// already kept candidate is below `threshold`. Token sets are computed once.
pub fn jaccard_dedup(texts: &[String], scores: &[f64], threshold: f64) -> Vec<usize> {
    if texts.len() <= 1 {
        return (0..texts.len()).collect();
    }

    let token_sets: Vec<HashSet<String>> = texts.iter().map(|t| text::token_set(t)).collect();

    let mut order: Vec<usize> = (0..texts.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut keep: Vec<usize> = Vec::new();
    for i in order {
        let duplicate = keep
            .iter()
            .any(|&j| jaccard(&token_sets[i], &token_sets[j]) >= threshold);
        if !duplicate {
            keep.push(i);
        }
    }
    keep
}
