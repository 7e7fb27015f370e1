//! Text analysis utilities
//!
//! Provides:
//! - Lowercase alphanumeric tokenization
//! - Keyword extraction with stopword filtering
//! - Phrase detection (quoted spans and salient n-grams)
//! - Query-focused snippet building

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::collections::HashSet;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").expect("valid token regex"));

static NUMERIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?$").expect("valid numeric regex"));

static QUOTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).expect("valid quote regex"));

/// Fixed English stopword list shared by keyword extraction, PRF term
/// selection, and the co-mention boost.
pub const STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
    "for", "with", "through", "during", "before", "after", "above", "below", "up", "down",
    "in", "out", "on", "off", "over", "under", "again", "further", "then", "once", "here",
    "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "should", "now",
];

static STOPWORD_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| STOPWORDS.iter().copied().collect());

/// Check whether a token is in the fixed stopword list.
pub fn is_stopword(token: &str) -> bool {
    STOPWORD_SET.contains(token)
}

/// Check whether a token is numeric (`123` or `12.5`).
pub fn is_numeric(token: &str) -> bool {
    NUMERIC_RE.is_match(token)
}

/// Check whether a token consists solely of ASCII digits.
pub fn is_all_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Extract maximal lowercase alphanumeric runs from the input.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Tokenize and collect into a set, for overlap computations.
pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Extract query keywords: numeric tokens first (input order), then distinct
/// non-stopword words of length > 2 sorted by decreasing length then
/// lexicographically, capped at `max_terms` words. The combined list is
/// deduplicated preserving order.
pub fn keywords(query: &str, max_terms: usize) -> Vec<String> {
    let terms = tokenize(query);
    let nums: Vec<String> = terms.iter().filter(|t| is_numeric(t)).cloned().collect();

    let mut words: Vec<String> = terms
        .iter()
        .filter(|t| !is_numeric(t) && !is_stopword(t) && t.len() > 2)
        .cloned()
        .collect();
    words.sort_unstable();
    words.dedup();
    words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    words.truncate(max_terms);

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(nums.len() + words.len());
    for term in nums.into_iter().chain(words) {
        if seen.insert(term.clone()) {
            out.push(term);
        }
    }
    out
}

/// Detect candidate phrases in a query: explicitly quoted spans plus query
/// bigrams longer than 6 characters and trigrams longer than 10.
///
/// Returned phrases are deduplicated preserving first occurrence.
pub fn detect_phrases(query: &str) -> Vec<String> {
    let mut phrases: Vec<String> = Vec::new();

    for caps in QUOTED_RE.captures_iter(query) {
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            phrases.push(m.as_str().to_string());
        }
    }

    let words = tokenize(query);
    if words.len() >= 2 {
        for pair in words.windows(2) {
            let bigram = pair.join(" ");
            if bigram.len() > 6 {
                phrases.push(bigram);
            }
        }
    }
    if words.len() >= 3 {
        for triple in words.windows(3) {
            let trigram = triple.join(" ");
            if trigram.len() > 10 {
                phrases.push(trigram);
            }
        }
    }

    let mut seen = HashSet::new();
    phrases.retain(|p| seen.insert(p.clone()));
    phrases
}

/// Split text into sentences at `.`, `!`, or `?` followed by whitespace.
/// Terminators stay attached to their sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?')
            && bytes.get(i + 1).is_some_and(|b| b.is_ascii_whitespace())
        {
            sentences.push(&text[start..=i]);
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            start = i;
        } else {
            i += 1;
        }
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Build a query-focused snippet: pick the sentence with the most query
/// tokens, take a window from one sentence before to three after, and
/// truncate to `max_chars` at the last space with an ellipsis.
pub fn best_snippet(text: &str, query: &str, max_chars: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return truncate_with_ellipsis(text, max_chars);
    }

    let query_tokens = token_set(query);
    let mut best = 0;
    let mut best_hits = 0usize;
    for (i, sentence) in sentences.iter().enumerate() {
        let lowered = sentence.to_lowercase();
        let hits = query_tokens.iter().filter(|t| lowered.contains(t.as_str())).count();
        if hits > best_hits {
            best_hits = hits;
            best = i;
        }
    }

    let left = best.saturating_sub(1);
    let right = (best + 3).min(sentences.len());
    let window = sentences[left..right].join(" ");

    if window.chars().count() > max_chars {
        let cut: String = window.chars().take(max_chars).collect();
        let trimmed = match cut.rfind(' ') {
            Some(idx) => &cut[..idx],
            None => cut.as_str(),
        };
        format!("{trimmed}…")
    } else {
        window
    }
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}…")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        let tokens = tokenize("The Act of 1789, ratified!");
        assert_eq!(tokens, vec!["the", "act", "of", "1789", "ratified"]);
    }

    #[test]
    fn test_numeric_detection() {
        assert!(is_numeric("1789"));
        assert!(is_numeric("12.5"));
        assert!(!is_numeric("v2"));
        assert!(is_all_digits("042"));
        assert!(!is_all_digits("12.5"));
    }

    #[test]
    fn test_keywords_order_and_cap() {
        let keys = keywords("the mitochondria of 1789 and cellular respiration", 16);
        // Numerics first, then words by decreasing length.
        assert_eq!(keys[0], "1789");
        assert_eq!(keys[1], "mitochondria");
        assert!(keys.contains(&"respiration".to_string()));
        assert!(keys.contains(&"cellular".to_string()));
        assert!(!keys.contains(&"the".to_string()));
    }

    #[test]
    fn test_keywords_drops_short_and_stopwords() {
        let keys = keywords("is it an ox", 16);
        assert!(keys.is_empty());
    }

    #[test]
    fn test_detect_phrases_includes_quoted_and_ngrams() {
        let phrases = detect_phrases("\"electoral college\" history vote");
        assert!(phrases.contains(&"electoral college".to_string()));
        assert!(phrases.contains(&"history vote".to_string()));
    }

    #[test]
    fn test_split_sentences_keeps_terminators() {
        let sents = split_sentences("First one. Second two! Third?");
        assert_eq!(sents, vec!["First one.", "Second two!", "Third?"]);
    }

    #[test]
    fn test_snippet_centers_on_best_sentence() {
        let text = "Alpha beta. The year 1789 was eventful. Gamma delta. Epsilon zeta. Eta theta.";
        let snippet = best_snippet(text, "1789", 280);
        assert!(snippet.contains("1789"));
        assert!(snippet.starts_with("Alpha beta."));
    }

    #[test]
    fn test_snippet_truncates_at_last_space() {
        let text = "word ".repeat(120);
        let snippet = best_snippet(&text, "word", 280);
        assert!(snippet.chars().count() <= 281);
        assert!(snippet.ends_with('…'));
    }
}
