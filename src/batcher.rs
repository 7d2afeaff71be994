//! Folding near-duplicate LLM requests into batches.
//!
//! Two requests are similar when the Jaccard similarity of their
//! fingerprints (prompt, query, and the start of the content) reaches the
//! threshold. Batching is greedy: each request joins the first batch whose
//! representative it resembles, otherwise it opens a new batch.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TokenwrightError};
use crate::similarity::{jaccard, token_set};

/// Characters of content that take part in the fingerprint.
pub const DEFAULT_PREFIX_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub prompt: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            content: content.into(),
            query: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Text the similarity of two requests is judged on.
pub fn fingerprint(request: &LlmRequest, prefix_chars: usize) -> String {
    let prefix: String = request.content.chars().take(prefix_chars).collect();
    format!(
        "{} {} {}",
        request.prompt,
        request.query.as_deref().unwrap_or_default(),
        prefix
    )
}

/// Index of the first request in `previous` at or above `threshold`.
pub fn detect_similar(
    request: &LlmRequest,
    previous: &[LlmRequest],
    threshold: f64,
) -> Option<usize> {
    detect_similar_with_prefix(request, previous, threshold, DEFAULT_PREFIX_CHARS)
}

pub fn detect_similar_with_prefix(
    request: &LlmRequest,
    previous: &[LlmRequest],
    threshold: f64,
    prefix_chars: usize,
) -> Option<usize> {
    let needle = token_set(&fingerprint(request, prefix_chars));
    previous
        .iter()
        .position(|other| jaccard(&needle, &token_set(&fingerprint(other, prefix_chars))) >= threshold)
}

/// Requests after folding, with the original indices behind each one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batched {
    /// One representative per batch (the first request that opened it).
    pub requests: Vec<LlmRequest>,
    /// `groups[b]` lists the original indices folded into batch `b`, ascending.
    pub groups: Vec<Vec<usize>>,
}

impl Batched {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Total number of original requests.
    pub fn original_len(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Batch that original request `index` was folded into.
    pub fn batch_of(&self, index: usize) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(&index))
    }

    /// Spread one result per batch back over the original request order.
    pub fn fan_out<T: Clone>(&self, results: &[T]) -> Result<Vec<T>> {
        if results.len() != self.groups.len() {
            return Err(TokenwrightError::validation(
                "results",
                format!(
                    "expected {} batch results, got {}",
                    self.groups.len(),
                    results.len()
                ),
            ));
        }
        let mut slots: Vec<Option<T>> = vec![None; self.original_len()];
        for (group, result) in self.groups.iter().zip(results) {
            for &i in group {
                if let Some(slot) = slots.get_mut(i) {
                    *slot = Some(result.clone());
                }
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| {
                    TokenwrightError::validation("groups", format!("index {i} is not in any batch"))
                })
            })
            .collect()
    }
}

pub fn batch(requests: &[LlmRequest], threshold: f64) -> Batched {
    batch_with_prefix(requests, threshold, DEFAULT_PREFIX_CHARS)
}

pub fn batch_with_prefix(requests: &[LlmRequest], threshold: f64, prefix_chars: usize) -> Batched {
    let mut batched = Batched {
        requests: Vec::new(),
        groups: Vec::new(),
    };
    let mut fingerprints: Vec<HashSet<String>> = Vec::new();

    for (i, request) in requests.iter().enumerate() {
        let needle = token_set(&fingerprint(request, prefix_chars));
        match fingerprints.iter().position(|rep| jaccard(&needle, rep) >= threshold) {
            Some(b) => batched.groups[b].push(i),
            None => {
                batched.requests.push(request.clone());
                batched.groups.push(vec![i]);
                fingerprints.push(needle);
            }
        }
    }

    debug!(
        requests = requests.len(),
        batches = batched.len(),
        threshold,
        "batched requests"
    );
    batched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requests() -> Vec<LlmRequest> {
        vec![
            LlmRequest::new("Fix the grammar", "the cat sat on the mat"),
            LlmRequest::new("Translate to French", "good morning to you"),
            LlmRequest::new("Fix the grammar", "the cat sat on the mat"),
            LlmRequest::new("Fix the grammar", "The cat sat on the mat!"),
            LlmRequest::new("Summarize", "quarterly revenue grew strongly"),
            LlmRequest::new("Translate to French", "good morning to you"),
        ]
    }

    #[test]
    fn fingerprint_uses_content_prefix() {
        let req = LlmRequest::new("P", "é".repeat(600)).with_query("q");
        let fp = fingerprint(&req, 500);
        assert_eq!(fp.chars().filter(|c| *c == 'é').count(), 500);
        assert!(fp.starts_with("P q "));
    }

    #[test]
    fn detect_similar_returns_first_match() {
        let reqs = requests();
        assert_eq!(detect_similar(&reqs[3], &reqs[..3], 0.85), Some(0));
        assert_eq!(detect_similar(&reqs[4], &reqs[..4], 0.85), None);
        assert_eq!(detect_similar(&reqs[0], &[], 0.85), None);
    }

    #[test]
    fn content_past_prefix_is_ignored() {
        let a = LlmRequest::new("Edit", format!("{}{}", "x ".repeat(250), "tail one"));
        let b = LlmRequest::new("Edit", format!("{}{}", "x ".repeat(250), "different ending"));
        assert_eq!(detect_similar(&a, std::slice::from_ref(&b), 1.0), Some(0));
    }

    #[test]
    fn batch_groups_similar_requests() {
        let batched = batch(&requests(), 0.85);
        assert_eq!(batched.len(), 3);
        assert_eq!(batched.groups, vec![vec![0, 2, 3], vec![1, 5], vec![4]]);
        assert_eq!(batched.requests[1].prompt, "Translate to French");
        assert_eq!(batched.batch_of(5), Some(1));
        assert_eq!(batched.batch_of(9), None);
    }

    #[test]
    fn batching_is_complete_for_any_threshold() {
        let reqs = requests();
        for threshold in [0.0, 0.3, 0.5, 0.85, 1.0, 1.5] {
            let batched = batch(&reqs, threshold);
            let mut all: Vec<usize> = batched.groups.iter().flatten().copied().collect();
            all.sort_unstable();
            assert_eq!(all, (0..reqs.len()).collect::<Vec<_>>(), "threshold {threshold}");
        }
        assert!(batch(&[], 0.5).is_empty());
    }

    #[test]
    fn fan_out_restores_original_order() {
        let batched = batch(&requests(), 0.85);
        let out = batched.fan_out(&["fixed", "traduit", "summary"]).unwrap();
        assert_eq!(
            out,
            vec!["fixed", "traduit", "fixed", "fixed", "summary", "traduit"]
        );
        assert!(batched.fan_out(&["only one"]).is_err());
    }
}
