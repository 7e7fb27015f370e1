//! Adaptive rerank-pool depth
//!
//! The depth of the embedding rerank pool depends on the shape of the
//! initial top-10 normalized BM25 scores. The selector is a closed set of
//! depths; the caller caps the chosen depth by the number of surviving
//! candidates.

use super::fusion::stddev;

/// Rerank pool depth, selected from the initial score distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankBudget {
    /// Flat top-10: no separation to exploit, rerank deep
    Flat,
    /// Steep head: rank 1 far ahead of rank 5, a shallow pool suffices
    SteepTop,
    /// Wide head-to-tail spread
    WideSpread,
    /// No distinguishing shape
    Standard,
}

impl RerankBudget {
    /// Pool depth for this budget.
    pub fn depth(self) -> usize {
        match self {
            RerankBudget::Flat => 100,
            RerankBudget::SteepTop => 70,
            RerankBudget::WideSpread => 80,
            RerankBudget::Standard => 90,
        }
    }

    /// Select a budget from the initial normalized scores (best first).
    pub fn select(scores: &[f64]) -> RerankBudget {
        if scores.len() < 10 {
            return RerankBudget::WideSpread;
        }
        let r1 = scores[0];
        let r5 = scores[4];
        let r10 = scores[9];
        let spread_std = stddev(&scores[..10]);

        if spread_std < 0.02 || (r1 - r10) < 0.1 {
            RerankBudget::Flat
        } else if r1 - r5 > 0.4 {
            RerankBudget::SteepTop
        } else if r1 - r10 > 0.5 {
            RerankBudget::WideSpread
        } else {
            RerankBudget::Standard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_scores_select_deep_pool() {
        let scores = vec![0.50; 12];
        assert_eq!(RerankBudget::select(&scores), RerankBudget::Flat);
        assert_eq!(RerankBudget::select(&scores).depth(), 100);
    }

    #[test]
    fn test_steep_top_selects_shallow_pool() {
        let scores = vec![0.95, 0.90, 0.85, 0.80, 0.40, 0.35, 0.30, 0.25, 0.20, 0.15];
        assert_eq!(RerankBudget::select(&scores), RerankBudget::SteepTop);
        assert_eq!(RerankBudget::select(&scores).depth(), 70);
    }

    #[test]
    fn test_wide_spread() {
        let scores = vec![0.90, 0.80, 0.75, 0.70, 0.60, 0.55, 0.50, 0.45, 0.40, 0.30];
        assert_eq!(RerankBudget::select(&scores), RerankBudget::WideSpread);
        assert_eq!(RerankBudget::select(&scores).depth(), 80);
    }

    #[test]
    fn test_standard_shape() {
        let scores = vec![0.80, 0.75, 0.72, 0.70, 0.68, 0.65, 0.62, 0.60, 0.58, 0.55];
        assert_eq!(RerankBudget::select(&scores), RerankBudget::Standard);
        assert_eq!(RerankBudget::select(&scores).depth(), 90);
    }

    #[test]
    fn test_short_lists_use_wide_spread_depth() {
        let scores = vec![0.9, 0.5, 0.1];
        assert_eq!(RerankBudget::select(&scores), RerankBudget::WideSpread);
    }

    #[test]
    fn test_depth_is_closed_set() {
        for budget in [
            RerankBudget::Flat,
            RerankBudget::SteepTop,
            RerankBudget::WideSpread,
            RerankBudget::Standard,
        ] {
            assert!([70, 80, 90, 100].contains(&budget.depth()));
        }
    }
}
