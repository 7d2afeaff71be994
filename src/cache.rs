//! Content-addressed memoization of optimization results.
//!
//! Keys are SHA-256 digests over the model name, a namespace and every
//! input that affects the result, so identical requests share an entry and
//! any changed input misses. Results computed through a fallback path are
//! never cached, and a failing store only costs a recomputation.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::optimizer::{OptimizedPrompt, PromptOptimizer};
use crate::store::KvStore;
use crate::tokens::Outcome;
use crate::windower::ContextWindower;

const KEY_PREFIX: &str = "result";

#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn KvStore>,
    ttl: Option<Duration>,
    model: String,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("ttl", &self.ttl)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ResultCache {
    pub fn new(store: Arc<dyn KvStore>, model: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            store,
            ttl,
            model: model.into(),
        }
    }

    /// Cache key for `parts` under `namespace`.
    ///
    /// Parts are length-prefixed, so `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn key(&self, namespace: &str, parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for part in [self.model.as_str(), namespace].iter().chain(parts) {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        format!("{KEY_PREFIX}:{namespace}:{:x}", hasher.finalize())
    }

    /// Return the cached value for `parts`, or compute and store it.
    pub fn memoize<T, F>(&self, namespace: &str, parts: &[&str], compute: F) -> Outcome<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Outcome<T>,
    {
        let key = self.key(namespace, parts);

        match self.store.get(&key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(namespace, key = %key, "cache hit");
                    return Outcome::clean(value);
                }
                Err(err) => warn!(namespace, error = %err, "ignoring unreadable cache entry"),
            },
            Ok(None) => debug!(namespace, key = %key, "cache miss"),
            Err(err) => warn!(namespace, error = %err, "cache read failed; recomputing"),
        }

        let outcome = compute();
        if outcome.degraded {
            debug!(namespace, "not caching degraded result");
            return outcome;
        }

        match serde_json::to_string(&outcome.value) {
            Ok(raw) => {
                if let Err(err) = self.store.set(&key, &raw, self.ttl) {
                    warn!(namespace, error = %err, "cache write failed");
                }
            }
            Err(err) => warn!(namespace, error = %err, "result not serializable; skipping cache"),
        }
        outcome
    }

    /// Memoized [`PromptOptimizer::optimize`].
    pub fn optimize_prompt(
        &self,
        optimizer: &PromptOptimizer,
        template: &str,
        content: &str,
        max_tokens: usize,
        reserved_tokens: usize,
    ) -> OptimizedPrompt {
        let settings = format!(
            "{:?}{:?}",
            optimizer.config(),
            optimizer.windower().config()
        );
        let (max, reserved) = (max_tokens.to_string(), reserved_tokens.to_string());
        let parts = [
            optimizer.counter().encoder_name(),
            settings.as_str(),
            template,
            content,
            max.as_str(),
            reserved.as_str(),
        ];
        self.memoize("optimize", &parts, || {
            let prompt = optimizer.optimize(template, content, max_tokens, reserved_tokens);
            Outcome {
                degraded: prompt.degraded,
                value: prompt,
            }
        })
        .into_value()
    }

    /// Memoized [`ContextWindower::window`].
    pub fn apply_window(
        &self,
        windower: &ContextWindower,
        content: &str,
        budget: usize,
        query: Option<&str>,
    ) -> Outcome<String> {
        let settings = format!("{:?}", windower.config());
        let budget_part = budget.to_string();
        // A leading marker keeps "no query" distinct from an empty query.
        let query_part = query.map(|q| format!("?{q}")).unwrap_or_default();
        let parts = [
            windower.counter().encoder_name(),
            settings.as_str(),
            content,
            budget_part.as_str(),
            query_part.as_str(),
        ];
        self.memoize("window", &parts, || windower.window(content, budget, query))
    }
}
