//! Vector maximal-marginal-relevance diversification
//!
//! Reorders the fused ranking to trade relevance against redundancy, using
//! cached document vectors. Only applied when nearly all candidates have a
//! usable vector.

use kbfuse_common::embeddings::dot;

/// Fraction of candidates with a nonzero cosine similarity.
pub fn vector_coverage(sims: &[f64]) -> f64 {
    if sims.is_empty() {
        return 0.0;
    }
    let nonzero = sims.iter().filter(|&&s| s > 0.0).count();
    nonzero as f64 / sims.len() as f64
}

/// Select up to `k_final` candidates balancing relevance and diversity.
///
/// `order` is the fused ranking (best first); `vectors[i]` is the cached
/// vector of candidate `i`, when present. The top candidate is always
/// selected; each following pick maximizes
/// `lambda * cos(q, r) - (1 - lambda) * max_sim(r, selected)`.
/// Candidates without vectors are skipped when scoring; an iteration where
/// nothing scores takes the ranking front so selection always progresses.
pub fn diversify(
    order: &[usize],
    vectors: &[Option<Vec<f32>>],
    query_vec: &[f32],
    lambda: f64,
    k_final: usize,
) -> Vec<usize> {
    if order.is_empty() {
        return Vec::new();
    }

    let mut remaining: Vec<usize> = order.to_vec();
    let mut selected = vec![remaining.remove(0)];

    while selected.len() < k_final && !remaining.is_empty() {
        let mut best: Option<(usize, f64)> = None;

        for (position, &candidate) in remaining.iter().enumerate() {
            let Some(candidate_vec) = &vectors[candidate] else {
                continue;
            };
            let relevance = dot(candidate_vec, query_vec) as f64;

            let mut max_sim = 0.0f64;
            for &chosen in &selected {
                if let Some(chosen_vec) = &vectors[chosen] {
                    max_sim = max_sim.max(dot(candidate_vec, chosen_vec) as f64);
                }
            }

            let score = lambda * relevance - (1.0 - lambda) * max_sim;
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((position, score));
            }
        }

        let position = best.map(|(p, _)| p).unwrap_or(0);
        selected.push(remaining.remove(position));
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_coverage() {
        assert_eq!(vector_coverage(&[]), 0.0);
        assert_eq!(vector_coverage(&[0.5, 0.0, 0.25, 0.75]), 0.75);
        assert_eq!(vector_coverage(&[0.1, 0.2]), 1.0);
    }

    #[test]
    fn test_diversify_prefers_novelty() {
        // Candidate 1 is more query-similar but nearly duplicates the seed;
        // candidate 2 is less similar but novel.
        let vectors = vec![
            Some(vec![0.6, 0.8]),
            Some(vec![0.707, 0.707]),
            Some(vec![0.6, -0.8]),
        ];
        let query = vec![1.0, 0.0];
        let selected = diversify(&[0, 1, 2], &vectors, &query, 0.7, 2);
        assert_eq!(selected, vec![0, 2]);
    }

    #[test]
    fn test_diversify_takes_top_first() {
        let vectors = vec![Some(vec![0.1, 0.9]), Some(vec![0.9, 0.1])];
        let query = vec![1.0, 0.0];
        // The fused ranking front is kept even when less query-similar.
        let selected = diversify(&[0, 1], &vectors, &query, 0.7, 2);
        assert_eq!(selected[0], 0);
    }

    #[test]
    fn test_diversify_caps_at_k_final() {
        let vectors: Vec<Option<Vec<f32>>> = (0..6).map(|i| {
            let angle = i as f32 * 0.3;
            Some(vec![angle.cos(), angle.sin()])
        }).collect();
        let query = vec![1.0, 0.0];
        let selected = diversify(&[0, 1, 2, 3, 4, 5], &vectors, &query, 0.7, 3);
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn test_diversify_progresses_without_vectors() {
        let vectors = vec![Some(vec![1.0, 0.0]), None, None];
        let query = vec![1.0, 0.0];
        let selected = diversify(&[0, 1, 2], &vectors, &query, 0.7, 3);
        assert_eq!(selected, vec![0, 1, 2]);
    }
}
