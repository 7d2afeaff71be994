//! Token-set similarity between short texts.
//!
//! Used to rank document segments against a query and to spot near-duplicate
//! requests. The score is the Jaccard index of the two normalised word sets.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}_\s]").expect("punctuation pattern is valid"));

/// Lowercase, strip punctuation and collapse runs of whitespace.
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lower, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Set of normalised words in `text`.
pub fn token_set(text: &str) -> HashSet<String> {
    normalize(text)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

/// Jaccard similarity of the word sets of `a` and `b`, in `[0.0, 1.0]`.
///
/// Returns 0.0 when either side is empty after normalisation.
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = token_set(a);
    let right = token_set(b);
    jaccard(&left, &right)
}

pub(crate) fn jaccard(left: &HashSet<String>, right: &HashSet<String>) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(right).count();
    let union = left.len() + right.len() - intersection;
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_and_collapses() {
        assert_eq!(normalize("  Hello,   World!\n"), "hello world");
        assert_eq!(normalize("don't"), "dont");
    }

    #[test]
    fn identical_texts_score_one() {
        assert_eq!(similarity("the cat sat", "the cat sat"), 1.0);
        assert_eq!(similarity("The cat sat.", "the CAT sat"), 1.0);
    }

    #[test]
    fn empty_inputs_score_zero() {
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("words", ""), 0.0);
        assert_eq!(similarity("...", "!!!"), 0.0);
    }

    #[test]
    fn partial_overlap_is_jaccard() {
        // {a, b, c} vs {b, c, d}: 2 shared out of 4.
        assert!((similarity("a b c", "b c d") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn similarity_is_symmetric_and_bounded() {
        let pairs = [
            ("quarterly revenue grew", "revenue grew strongly this quarter"),
            ("alpha", "beta"),
            ("one two two three", "three"),
            ("Ünïcode wörds", "wörds"),
        ];
        for (a, b) in pairs {
            let ab = similarity(a, b);
            let ba = similarity(b, a);
            assert_eq!(ab, ba);
            assert!((0.0..=1.0).contains(&ab));
        }
    }

    #[test]
    fn duplicate_words_count_once() {
        assert_eq!(similarity("go go go", "go"), 1.0);
    }
}
