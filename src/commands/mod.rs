pub mod batch;
pub mod chunk;
pub mod context;
pub mod count;
pub mod init;
pub mod optimize;
pub mod window;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResultCache;
use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::error::{Result, TokenwrightError};
use crate::store::FileStore;
use crate::tokens::TokenCounter;

/// Subdirectory of the cache holding memoized results.
pub const RESULTS_DIR: &str = "results";
/// Subdirectory of the cache holding conversation contexts.
pub const CONTEXTS_DIR: &str = "contexts";

/// Resolved settings shared by every command.
#[derive(Debug, Clone)]
pub struct Runtime {
    pub config: Config,
    pub cache_dir: PathBuf,
    pub quiet: bool,
}

impl Runtime {
    pub fn counter(&self) -> TokenCounter {
        TokenCounter::for_model(&self.config.model, self.config.encoder)
    }

    /// Result cache under [`RESULTS_DIR`], or `None` when disabled.
    pub fn result_cache(&self) -> Result<Option<ResultCache>> {
        if !self.config.cache.enabled {
            return Ok(None);
        }
        let store = FileStore::open(self.cache_dir.join(RESULTS_DIR))?;
        let ttl = (self.config.cache.ttl_secs > 0)
            .then(|| Duration::from_secs(self.config.cache.ttl_secs));
        Ok(Some(ResultCache::new(
            Arc::new(store),
            self.config.model.clone(),
            ttl,
        )))
    }

    /// Conversation contexts under [`CONTEXTS_DIR`].
    pub fn conversations(&self) -> Result<ConversationStore> {
        let store = FileStore::open(self.cache_dir.join(CONTEXTS_DIR))?;
        Ok(ConversationStore::new(
            Arc::new(store),
            self.counter(),
            self.config.conversation.clone(),
        )
        .with_window_config(self.config.window.clone()))
    }
}

/// Read a file, or stdin when `path` is `None` or `-`.
pub fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .map_err(|e| TokenwrightError::io(format!("reading '{}'", p.display()), e)),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| TokenwrightError::io("reading stdin", e))?;
            Ok(buf)
        }
    }
}
