//! Handler for `tokenwright init`.

use std::path::PathBuf;

use super::{CONTEXTS_DIR, RESULTS_DIR};
use crate::config::Config;
use crate::error::{Result, TokenwrightError};
use crate::store::FileStore;
use crate::tokens::TokenCounter;

pub struct InitOptions {
    pub config_path: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub force: bool,
}

#[derive(Debug)]
pub struct InitResult {
    pub config_path: PathBuf,
    pub cache_dir: Option<PathBuf>,
    /// Encoder the default model resolves to on this build.
    pub encoder: String,
    /// Expired entries removed from an existing cache.
    pub purged: usize,
}

/// Write a default config and lay out the result and context stores.
///
/// The written config records `cache_dir` when one is given. Re-running
/// over an existing cache keeps live entries and drops expired ones.
pub fn run(options: InitOptions) -> Result<InitResult> {
    if options.config_path.exists() && !options.force {
        return Err(TokenwrightError::config(format!(
            "config already exists at '{}' (use --force to overwrite)",
            options.config_path.display()
        )));
    }

    let mut config = Config::default();
    config.cache.dir = options.cache_dir.clone();
    config.save(&options.config_path)?;

    let mut purged = 0;
    if let Some(ref dir) = options.cache_dir {
        for sub in [RESULTS_DIR, CONTEXTS_DIR] {
            purged += FileStore::open(dir.join(sub))?.purge_expired()?;
        }
    }

    let encoder = TokenCounter::for_model(&config.model, config.encoder)
        .encoder_name()
        .to_string();

    Ok(InitResult {
        config_path: options.config_path,
        cache_dir: options.cache_dir,
        encoder,
        purged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KvStore;
    use std::time::Duration;

    fn options(dir: &tempfile::TempDir, force: bool) -> InitOptions {
        InitOptions {
            config_path: dir.path().join("tokenwright.toml"),
            cache_dir: Some(dir.path().join("cache")),
            force,
        }
    }

    #[test]
    fn lays_out_config_and_stores() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(options(&dir, false)).unwrap();

        let cache = result.cache_dir.unwrap();
        assert!(cache.join(RESULTS_DIR).is_dir());
        assert!(cache.join(CONTEXTS_DIR).is_dir());
        assert_eq!(result.purged, 0);
        assert!(!result.encoder.is_empty());
        let config = Config::load(&result.config_path).unwrap();
        assert_eq!(config.cache.dir, Some(cache));
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        run(options(&dir, false)).unwrap();
        let err = run(options(&dir, false)).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn force_resets_config_and_purges_expired() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tokenwright.toml"), "model = \"gpt-4o\"\n").unwrap();
        let results = FileStore::open(dir.path().join("cache").join(RESULTS_DIR)).unwrap();
        results.set("live", "1", None).unwrap();
        results.set("stale", "2", Some(Duration::ZERO)).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let result = run(options(&dir, true)).unwrap();
        assert_eq!(result.purged, 1);
        assert_eq!(results.get("live").unwrap().as_deref(), Some("1"));
        let config = Config::load(&result.config_path).unwrap();
        assert_eq!(config.model, Config::default().model);
    }
}
