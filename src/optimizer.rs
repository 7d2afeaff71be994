//! Prompt assembly under a token budget.
//!
//! [`PromptOptimizer::optimize`] fits one block of content into a prompt
//! template. [`PromptOptimizer::optimize_template`] does the same for a
//! template with several named `{fields}`, shrinking only the large ones.
//!
//! Content that is far over its allowance is windowed (paragraph-level
//! selection); content that is only slightly over is truncated. Whatever the
//! path, the assembled prompt is re-counted and cut as a last resort so it
//! never exceeds `max_tokens - reserved_tokens`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{OptimizerConfig, WindowConfig};
use crate::error::{Result, TokenwrightError};
use crate::tokens::{Outcome, TokenCounter};
use crate::windower::ContextWindower;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

const CONTENT_PLACEHOLDER: &str = "{content}";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What happened to the content while fitting it.
///
/// Ordered by severity so the strongest intervention wins when several
/// fields are optimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStrategy {
    Unchanged,
    Truncated,
    Windowed,
    /// No room left for content at all.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedPrompt {
    pub text: String,
    pub tokens: usize,
    pub strategy: ContentStrategy,
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct PromptOptimizer {
    counter: TokenCounter,
    windower: ContextWindower,
    config: OptimizerConfig,
}

impl PromptOptimizer {
    pub fn new(counter: TokenCounter, config: OptimizerConfig, window: WindowConfig) -> Self {
        Self {
            windower: ContextWindower::new(counter.clone(), window),
            counter,
            config,
        }
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn windower(&self) -> &ContextWindower {
        &self.windower
    }

    /// Fit `content` into `template` within `max_tokens - reserved_tokens`.
    ///
    /// Content replaces a `{content}` placeholder when the template has one
    /// and is appended after a blank line otherwise. When the template and
    /// reservations leave no room, the template is returned unmodified.
    pub fn optimize(
        &self,
        template: &str,
        content: &str,
        max_tokens: usize,
        reserved_tokens: usize,
    ) -> OptimizedPrompt {
        let limit = max_tokens.saturating_sub(reserved_tokens);
        let template_tokens = self.counter.count_checked(template);
        let mut degraded = template_tokens.degraded;

        let available = limit.saturating_sub(template_tokens.value + self.config.buffer_tokens);
        if available == 0 {
            warn!(
                max_tokens,
                reserved_tokens,
                template_tokens = template_tokens.value,
                "no room for content; returning template only"
            );
            return OptimizedPrompt {
                tokens: template_tokens.value,
                text: template.to_string(),
                strategy: ContentStrategy::Dropped,
                degraded,
            };
        }

        let (fitted, mut strategy) = self.fit(content, available);
        degraded |= fitted.degraded;

        let text = assemble(template, &fitted.value);
        let checked = self.enforce_limit(text, limit);
        degraded |= checked.degraded;
        if checked.value.1 && strategy == ContentStrategy::Unchanged {
            strategy = ContentStrategy::Truncated;
        }
        let text = checked.value.0;

        let tokens = self.counter.count(&text);
        debug!(limit, available, tokens, ?strategy, "optimized prompt");
        OptimizedPrompt {
            text,
            tokens,
            strategy,
            degraded,
        }
    }

    /// Substitute `params` into a template with named `{field}` placeholders,
    /// shrinking oversized fields so the result fits the budget.
    ///
    /// Only fields above the configured size threshold are shrunk. They
    /// share the remaining allowance in proportion to their size, each
    /// keeping at least the configured floor.
    pub fn optimize_template(
        &self,
        template: &str,
        params: &BTreeMap<String, String>,
        max_tokens: usize,
        reserved_tokens: usize,
    ) -> Result<OptimizedPrompt> {
        let names = template_variables(template);
        let mut missing: Vec<String> = names
            .iter()
            .filter(|n| !params.contains_key(*n))
            .cloned()
            .collect();
        missing.sort();
        if !missing.is_empty() {
            return Err(TokenwrightError::MalformedTemplate { missing });
        }

        let limit = max_tokens.saturating_sub(reserved_tokens);
        let skeleton = PLACEHOLDER.replace_all(template, "");
        let skeleton_tokens = self.counter.count_checked(&skeleton);
        let mut degraded = skeleton_tokens.degraded;

        let mut values: HashMap<&str, String> = HashMap::new();
        let mut candidates: Vec<(&str, usize)> = Vec::new();
        let mut fixed = 0;
        for name in &names {
            let value = &params[name];
            let size = self.counter.count_checked(value);
            degraded |= size.degraded;
            if size.value > self.config.field_threshold_tokens {
                candidates.push((name.as_str(), size.value));
            } else {
                fixed += size.value;
            }
            values.insert(name.as_str(), value.clone());
        }

        let available = limit
            .saturating_sub(skeleton_tokens.value + fixed + self.config.buffer_tokens);
        let candidate_total: usize = candidates.iter().map(|(_, s)| s).sum();

        let mut strategy = ContentStrategy::Unchanged;
        if candidate_total > available {
            for &(name, size) in &candidates {
                let proportional =
                    (available as f64 * size as f64 / candidate_total as f64).floor() as usize;
                let share = proportional.max(self.config.field_floor_tokens).min(size);
                let (fitted, field_strategy) = self.fit(&params[name], share);
                degraded |= fitted.degraded;
                strategy = strategy.max(field_strategy);
                debug!(field = name, size, share, ?field_strategy, "optimized template field");
                values.insert(name, fitted.value);
            }
        }

        let text = PLACEHOLDER
            .replace_all(template, |caps: &Captures<'_>| {
                values.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned();

        let checked = self.enforce_limit(text, limit);
        degraded |= checked.degraded;
        if checked.value.1 && strategy == ContentStrategy::Unchanged {
            strategy = ContentStrategy::Truncated;
        }
        let text = checked.value.0;
        let tokens = self.counter.count(&text);

        Ok(OptimizedPrompt {
            text,
            tokens,
            strategy,
            degraded,
        })
    }

    /// Shrink `content` to `allowance` tokens: windowing for large gaps,
    /// truncation for small ones.
    fn fit(&self, content: &str, allowance: usize) -> (Outcome<String>, ContentStrategy) {
        let size = self.counter.count_checked(content);
        if size.value <= allowance {
            return (
                Outcome::clean(content.to_string()).absorb(size.degraded),
                ContentStrategy::Unchanged,
            );
        }
        if size.value as f64 > allowance as f64 * self.config.window_ratio {
            let windowed = self.windower.window(content, allowance, None);
            (windowed.absorb(size.degraded), ContentStrategy::Windowed)
        } else {
            let truncated = self.counter.truncate(content, allowance);
            (truncated.absorb(size.degraded), ContentStrategy::Truncated)
        }
    }

    /// Cut `text` to `limit` tokens if needed. The flag is true when a cut happened.
    fn enforce_limit(&self, text: String, limit: usize) -> Outcome<(String, bool)> {
        let tokens = self.counter.count_checked(&text);
        if tokens.value <= limit {
            return Outcome::clean((text, false)).absorb(tokens.degraded);
        }
        warn!(
            tokens = tokens.value,
            limit, "assembled prompt over budget; truncating"
        );
        self.counter
            .truncate(&text, limit)
            .map(|t| (t, true))
            .absorb(tokens.degraded)
    }
}

/// Names of the `{placeholders}` in `template`, in order of first use.
pub fn template_variables(template: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

fn assemble(template: &str, content: &str) -> String {
    if template.contains(CONTENT_PLACEHOLDER) {
        template.replace(CONTENT_PLACEHOLDER, content)
    } else if content.is_empty() {
        template.to_string()
    } else if template.is_empty() {
        content.to_string()
    } else {
        format!("{template}\n\n{content}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
