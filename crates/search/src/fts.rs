//! Full-text match expression builder
//!
//! Turns keyword lists into FTS5 match expressions. Word terms are quoted,
//! numeric terms are emitted bare. Three forms are available: the base
//! disjunction, a phrase-augmented variant, and the anchored expansion used
//! by pseudo-relevance feedback.

use crate::{MAX_ANCHOR_TERMS, MAX_EXPANSION_TERMS};
use kbfuse_common::text;

fn render_term(term: &str) -> String {
    if text::is_numeric(term) {
        term.to_string()
    } else {
        format!("\"{term}\"")
    }
}

/// Join keywords into an OR-disjunction, or `None` when there are none.
pub fn or_expression(keys: &[String]) -> Option<String> {
    if keys.is_empty() {
        return None;
    }
    Some(
        keys.iter()
            .map(|k| render_term(k))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

/// Base disjunction augmented with quoted multi-word phrases:
/// `(base) OR (phrase₁ OR phrase₂ …)`.
pub fn with_phrases(keys: &[String], phrases: &[String]) -> Option<String> {
    let base = or_expression(keys);
    let phrase_parts: Vec<String> = phrases
        .iter()
        .filter(|p| text::tokenize(p).len() >= 2)
        .map(|p| format!("\"{p}\""))
        .collect();
    if phrase_parts.is_empty() {
        return base;
    }
    let phrase_query = phrase_parts.join(" OR ");
    match base {
        Some(base) => Some(format!("({base}) OR ({phrase_query})")),
        None => Some(phrase_query),
    }
}

/// Anchored expansion: `(A₁ OR A₂ OR A₃) OR (A₁ AND (E₁ OR … OR E₅))`.
///
/// At most three anchors from the original keywords and five expansion
/// terms are used; the lead anchor in the AND clause is emitted bare.
pub fn expanded_expression(orig_keys: &[String], expansion_terms: &[String]) -> Option<String> {
    if orig_keys.is_empty() {
        return if expansion_terms.is_empty() {
            None
        } else {
            or_expression(expansion_terms)
        };
    }
    if expansion_terms.is_empty() {
        return or_expression(orig_keys);
    }

    let anchor_count = orig_keys.len().min(MAX_ANCHOR_TERMS);
    let expansion_count = expansion_terms.len().min(MAX_EXPANSION_TERMS);
    let anchors = or_expression(&orig_keys[..anchor_count])?;
    let expansions = or_expression(&expansion_terms[..expansion_count])?;
    Some(format!(
        "({anchors}) OR ({} AND ({expansions}))",
        orig_keys[0]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(terms: &[&str]) -> Vec<String> {
        terms.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_or_expression_quotes_words_not_numbers() {
        let expr = or_expression(&keys(&["1789", "ratification"])).unwrap();
        assert_eq!(expr, "1789 OR \"ratification\"");
    }

    #[test]
    fn test_or_expression_empty() {
        assert_eq!(or_expression(&[]), None);
    }

    #[test]
    fn test_with_phrases_appends_disjunction() {
        let expr = with_phrases(&keys(&["college"]), &keys(&["electoral college"])).unwrap();
        assert_eq!(expr, "(\"college\") OR (\"electoral college\")");
    }

    #[test]
    fn test_with_phrases_skips_single_word_phrases() {
        let expr = with_phrases(&keys(&["college"]), &keys(&["electoral"])).unwrap();
        assert_eq!(expr, "\"college\"");
    }

    #[test]
    fn test_expanded_expression_caps_anchors_and_expansions() {
        let orig = keys(&["alpha", "beta", "gamma", "delta"]);
        let terms = keys(&["one", "two", "three", "four", "five", "six"]);
        let expr = expanded_expression(&orig, &terms).unwrap();
        assert_eq!(
            expr,
            "(\"alpha\" OR \"beta\" OR \"gamma\") OR (alpha AND (\"one\" OR \"two\" OR \"three\" OR \"four\" OR \"five\"))"
        );
    }

    #[test]
    fn test_expanded_expression_without_expansions_falls_back() {
        let expr = expanded_expression(&keys(&["alpha"]), &[]).unwrap();
        assert_eq!(expr, "\"alpha\"");
    }
}
