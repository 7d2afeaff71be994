//! Context windowing: fitting an over-long document into a token budget.
//!
//! Two selection strategies are supported:
//!
//! - **Query mode**: segments are ranked by word-set similarity to the query.
//!   The best segment is always kept, further segments are added while they
//!   clear the relevance threshold, and the window is backfilled with less
//!   relevant segments when relevance alone leaves it under half full.
//! - **Position mode**: the budget is split between the start of the
//!   document, its end, and the segments nearest its midpoint.
//!
//! Selected segments are emitted in document order. If the assembled text
//! still exceeds the budget, it is hard-truncated, so the output never
//! exceeds the budget.

use serde::Serialize;
use tracing::debug;

use crate::config::WindowConfig;
use crate::segment::{self, Segmentation};
use crate::similarity;
use crate::tokens::{Outcome, TokenCounter};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// How the window was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    /// Content already fit the budget.
    Unchanged,
    /// Segments selected by relevance to a query.
    Query,
    /// Segments selected by position (start, end, middle).
    Position,
    /// No segment fit on its own; content was truncated.
    Truncated,
}

/// Detailed result of a windowing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowReport {
    pub text: String,
    pub mode: WindowMode,
    /// Indices (in document order) of the segments kept.
    pub selected: Vec<usize>,
    pub segment_count: usize,
    /// Token count of `text`.
    pub tokens: usize,
    /// True if the assembled selection had to be cut to fit.
    pub hard_truncated: bool,
    pub degraded: bool,
}

/// Selects the parts of a document that fit a token budget.
#[derive(Debug, Clone)]
pub struct ContextWindower {
    counter: TokenCounter,
    config: WindowConfig,
}

/// Per-call selection inputs shared by both strategies.
struct Candidates<'a> {
    seg: &'a Segmentation,
    sizes: Vec<usize>,
    separator: usize,
    budget: usize,
}

impl Candidates<'_> {
    fn cost(&self, i: usize) -> usize {
        self.sizes[i] + self.separator
    }

    fn len(&self) -> usize {
        self.seg.segments.len()
    }
}

impl ContextWindower {
    pub fn new(counter: TokenCounter, config: WindowConfig) -> Self {
        Self { counter, config }
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Fit `content` into `budget` tokens, using `query` for relevance
    /// ranking when given.
    pub fn window(&self, content: &str, budget: usize, query: Option<&str>) -> Outcome<String> {
        self.window_with_threshold(content, budget, query, self.config.relevance_threshold)
    }

    pub fn window_with_threshold(
        &self,
        content: &str,
        budget: usize,
        query: Option<&str>,
        threshold: f64,
    ) -> Outcome<String> {
        let report = self.window_report(content, budget, query, threshold);
        Outcome {
            value: report.text,
            degraded: report.degraded,
        }
    }

    pub fn window_report(
        &self,
        content: &str,
        budget: usize,
        query: Option<&str>,
        threshold: f64,
    ) -> WindowReport {
        let total = self.counter.count_checked(content);
        let mut degraded = total.degraded;

        let seg = segment::segment(content);
        if total.value <= budget {
            return WindowReport {
                text: content.to_string(),
                mode: WindowMode::Unchanged,
                selected: (0..seg.segments.len()).collect(),
                segment_count: seg.segments.len(),
                tokens: total.value,
                hard_truncated: false,
                degraded,
            };
        }

        let sizes = seg
            .segments
            .iter()
            .map(|s| {
                let c = self.counter.count_checked(s);
                degraded |= c.degraded;
                c.value
            })
            .collect();
        let candidates = Candidates {
            seg: &seg,
            sizes,
            separator: self.counter.count(seg.kind.separator()),
            budget,
        };

        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let (mut mode, mut selected) = match query {
            Some(q) => (
                WindowMode::Query,
                self.select_by_query(&candidates, q, threshold),
            ),
            None => (WindowMode::Position, self.select_by_position(&candidates)),
        };
        selected.sort_unstable();

        let mut text = seg.join(selected.iter().copied());
        if selected.is_empty() || text.is_empty() {
            mode = WindowMode::Truncated;
            text = content.to_string();
        }

        let mut hard_truncated = false;
        let assembled = self.counter.count_checked(&text);
        degraded |= assembled.degraded;
        let mut tokens = assembled.value;
        if tokens > budget {
            let cut = self.counter.truncate(&text, budget);
            degraded |= cut.degraded;
            text = cut.value;
            tokens = self.counter.count(&text);
            hard_truncated = true;
        }

        debug!(
            ?mode,
            budget,
            tokens,
            segments = seg.segments.len(),
            kept = selected.len(),
            hard_truncated,
            "applied context window"
        );

        WindowReport {
            text,
            mode,
            selected,
            segment_count: seg.segments.len(),
            tokens,
            hard_truncated,
            degraded,
        }
    }

    /// Relevance selection. Returns unordered segment indices.
    fn select_by_query(&self, c: &Candidates<'_>, query: &str, threshold: f64) -> Vec<usize> {
        if c.seg.segments.is_empty() {
            return Vec::new();
        }

        let query_words = similarity::token_set(query);
        let mut scored: Vec<(usize, f64)> = c
            .seg
            .segments
            .iter()
            .enumerate()
            .map(|(i, s)| (i, similarity::jaccard(&similarity::token_set(s), &query_words)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut taken = vec![false; c.len()];
        let mut selected = Vec::new();

        // The best match is kept unconditionally.
        let (top, _) = scored[0];
        taken[top] = true;
        selected.push(top);
        let mut used = c.sizes[top];

        for &(i, score) in &scored[1..] {
            if score < threshold {
                break;
            }
            let cost = c.cost(i);
            if used + cost + self.config.overlap_margin > c.budget {
                break;
            }
            taken[i] = true;
            selected.push(i);
            used += cost;
        }

        if used < c.budget / 2 {
            for &(i, _) in &scored {
                if taken[i] {
                    continue;
                }
                let cost = c.cost(i);
                if used + cost <= c.budget {
                    taken[i] = true;
                    selected.push(i);
                    used += cost;
                }
            }
        }

        selected
    }

    /// Positional selection: lead, tail, then the segments nearest the middle.
    fn select_by_position(&self, c: &Candidates<'_>) -> Vec<usize> {
        let n = c.len();
        let lead_budget = share(c.budget, self.config.lead_share);
        let tail_budget = share(c.budget, self.config.tail_share);

        let mut taken = vec![false; n];
        let mut selected = Vec::new();

        let mut lead_used = 0;
        for i in 0..n {
            let cost = c.cost(i);
            if lead_used + cost > lead_budget {
                break;
            }
            taken[i] = true;
            selected.push(i);
            lead_used += cost;
        }

        let mut tail_used = 0;
        for i in (0..n).rev() {
            if taken[i] {
                break;
            }
            let cost = c.cost(i);
            if tail_used + cost > tail_budget {
                break;
            }
            taken[i] = true;
            selected.push(i);
            tail_used += cost;
        }

        // Unused lead/tail allocation rolls over to the middle.
        let middle_budget = c.budget.saturating_sub(lead_used + tail_used);
        let midpoint = n.saturating_sub(1) as f64 / 2.0;
        let mut middle: Vec<usize> = (0..n).filter(|&i| !taken[i]).collect();
        middle.sort_by(|&a, &b| {
            let da = (a as f64 - midpoint).abs();
            let db = (b as f64 - midpoint).abs();
            da.partial_cmp(&db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(&b))
        });

        let mut middle_used = 0;
        for i in middle {
            let cost = c.cost(i);
            if middle_used + cost <= middle_budget {
                selected.push(i);
                middle_used += cost;
            }
        }

        selected
    }
}

fn share(budget: usize, fraction: f64) -> usize {
    (budget as f64 * fraction).floor() as usize
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::tests::{broken_counter, byte_counter, MIXED_SCRIPT};

    fn windower() -> ContextWindower {
        ContextWindower::new(TokenCounter::piece(), WindowConfig::default())
    }

    fn numbered_paragraphs(n: usize) -> String {
        (0..n)
            .map(|i| format!("Paragraph {i} body text here."))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    const TOPICS: &str = "The garden needs watering every morning in summer.\n\n\
        Database indexing improves query performance dramatically.\n\n\
        Cats sleep most of the day.\n\n\
        Composite indexes help database query planners.";

    #[test]
    fn content_within_budget_is_unchanged() {
        let w = windower();
        let out = w.window("small text", 100, None);
        assert_eq!(out.value, "small text");
        let report = w.window_report("small text", 100, None, 0.3);
        assert_eq!(report.mode, WindowMode::Unchanged);
    }

    #[test]
    fn position_mode_keeps_lead_tail_and_center() {
        let w = windower();
        let content = numbered_paragraphs(9);
        // Each paragraph is 11 tokens plus a 1-token separator.
        let report = w.window_report(&content, 60, None, 0.3);
        assert_eq!(report.mode, WindowMode::Position);
        assert_eq!(report.selected, vec![0, 1, 3, 4, 8]);
        assert!(report.tokens <= 60);
        assert!(!report.hard_truncated);

        let p0 = report.text.find("Paragraph 0").unwrap();
        let p4 = report.text.find("Paragraph 4").unwrap();
        let p8 = report.text.find("Paragraph 8").unwrap();
        assert!(p0 < p4 && p4 < p8);
        assert!(!report.text.contains("Paragraph 5"));
    }

    #[test]
    fn query_mode_prefers_relevant_segment() {
        let w = windower();
        let out = w.window(TOPICS, 40, Some("database query indexing"));
        assert_eq!(
            out.value,
            "Database indexing improves query performance dramatically."
        );
    }

    #[test]
    fn lower_threshold_admits_more_segments_in_order() {
        let w = windower();
        let out = w.window_with_threshold(TOPICS, 60, Some("database query indexing"), 0.2);
        assert_eq!(
            out.value,
            "Database indexing improves query performance dramatically.\n\n\
             Composite indexes help database query planners."
        );
    }

    #[test]
    fn sparse_relevance_backfills_window() {
        let w = windower();
        let report = w.window_report(TOPICS, 60, Some("cats"), 0.3);
        assert_eq!(report.selected, vec![0, 1, 2]);
        assert!(report.text.starts_with("The garden"));
        assert!(report.tokens <= 60);
    }

    #[test]
    fn query_mode_never_empty() {
        let w = windower();
        let out = w.window(TOPICS, 15, Some("zebra migration patterns"));
        assert!(!out.value.is_empty());
        assert!(w.counter().count(&out.value) <= 15);
    }

    #[test]
    fn oversized_single_segment_is_truncated() {
        let w = windower();
        let content = "A".repeat(2000);
        let report = w.window_report(&content, 50, None, 0.3);
        assert_eq!(report.mode, WindowMode::Truncated);
        assert_eq!(report.tokens, 50);
    }

    #[test]
    fn budget_is_respected_and_windowing_is_idempotent() {
        let w = windower();
        let docs = [
            numbered_paragraphs(30),
            TOPICS.to_string(),
            "one line\nanother line\nthird line that is a bit longer".repeat(10),
            "Sentence without breaks ".repeat(40),
            "Short. Sentences. Everywhere. In. This. Text.".repeat(20),
        ];
        let queries = [None, Some("paragraph text"), Some("line")];
        for doc in &docs {
            for budget in [0, 1, 7, 25, 64, 200] {
                for query in queries {
                    let once = w.window(doc, budget, query).value;
                    assert!(
                        w.counter().count(&once) <= budget,
                        "budget {budget} exceeded for query {query:?}"
                    );
                    let twice = w.window(&once, budget, query).value;
                    assert_eq!(once, twice);
                }
            }
        }
    }

    #[test]
    fn broken_encoder_reports_degraded() {
        let w = ContextWindower::new(broken_counter(), WindowConfig::default());
        let out = w.window(&numbered_paragraphs(40), 30, None);
        assert!(out.degraded);
        assert!(!out.value.is_empty());
    }

    #[test]
    fn hard_truncation_respects_character_boundaries() {
        let counter = byte_counter();
        let w = ContextWindower::new(counter.clone(), WindowConfig::default());
        let content = MIXED_SCRIPT.repeat(4);
        for budget in [1, 2, 5, 10, 17, 40, 100] {
            for query in [None, Some("crème")] {
                let out = w.window(&content, budget, query);
                assert!(!out.degraded, "budget {budget}");
                assert!(counter.count(&out.value) <= budget, "budget {budget}");
            }
        }
    }
}
