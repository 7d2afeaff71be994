use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TokenwrightError};
use crate::tokens::EncoderKind;

/// Top-level configuration for tokenwright.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Model name; selects the encoder vocabulary and fallback ratio.
    pub model: String,
    pub encoder: EncoderKind,
    pub window: WindowConfig,
    pub optimizer: OptimizerConfig,
    pub chunker: ChunkerConfig,
    pub batcher: BatcherConfig,
    pub conversation: ConversationConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Minimum similarity for a segment to be picked by relevance.
    pub relevance_threshold: f64,
    /// Headroom kept free while adding relevant segments.
    pub overlap_margin: usize,
    /// Share of the budget given to leading segments in position mode.
    pub lead_share: f64,
    /// Share of the budget given to trailing segments in position mode.
    pub tail_share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Tokens held back for formatting overhead.
    pub buffer_tokens: usize,
    /// Content this many times over its allowance is windowed, not truncated.
    pub window_ratio: f64,
    /// Template fields above this size are candidates for optimization.
    pub field_threshold_tokens: usize,
    /// Smallest allowance any optimized field is cut down to.
    pub field_floor_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatcherConfig {
    pub similarity_threshold: f64,
    /// Characters of request content included in its fingerprint.
    pub content_prefix_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationConfig {
    /// Message count above which a conversation is trimmed on append.
    pub max_messages: usize,
    /// Token budget used for automatic trimming.
    pub max_tokens: usize,
    /// Largest share of a model budget a document snapshot may take.
    pub document_share: f64,
    pub ttl_secs: u64,
    pub default_system_message: String,
    pub role_weights: RoleWeights,
}

/// Multipliers applied to per-message token counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoleWeights {
    pub system: f64,
    pub assistant: f64,
    pub user: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub ttl_secs: u64,
}

// --- Defaults ---

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "gpt-4".into(),
            encoder: EncoderKind::Auto,
            window: WindowConfig::default(),
            optimizer: OptimizerConfig::default(),
            chunker: ChunkerConfig::default(),
            batcher: BatcherConfig::default(),
            conversation: ConversationConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.3,
            overlap_margin: 10,
            lead_share: 0.4,
            tail_share: 0.3,
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            buffer_tokens: 100,
            window_ratio: 1.5,
            field_threshold_tokens: 200,
            field_floor_tokens: 50,
        }
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 100,
        }
    }
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            content_prefix_chars: 500,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_messages: 20,
            max_tokens: 4000,
            document_share: 0.5,
            ttl_secs: 86_400,
            default_system_message: "You are a helpful writing assistant.".into(),
            role_weights: RoleWeights::default(),
        }
    }
}

impl Default for RoleWeights {
    fn default() -> Self {
        Self {
            system: 1.5,
            assistant: 1.2,
            user: 1.0,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            ttl_secs: 3600,
        }
    }
}

// --- Config methods ---

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TokenwrightError::io(format!("reading config from '{}'", path.display()), e)
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| TokenwrightError::config_with_source("failed to parse config", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| TokenwrightError::config_with_source("failed to serialize config", e))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TokenwrightError::io(
                    format!("creating config directory '{}'", parent.display()),
                    e,
                )
            })?;
        }
        std::fs::write(path, content).map_err(|e| {
            TokenwrightError::io(format!("writing config to '{}'", path.display()), e)
        })
    }

    /// Validate config values.
    pub fn validate(&self) -> Result<()> {
        let unit = |field: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(TokenwrightError::validation(field, "must be between 0 and 1"))
            }
        };
        unit("window.relevance_threshold", self.window.relevance_threshold)?;
        unit("window.lead_share", self.window.lead_share)?;
        unit("window.tail_share", self.window.tail_share)?;
        unit("batcher.similarity_threshold", self.batcher.similarity_threshold)?;
        unit("conversation.document_share", self.conversation.document_share)?;

        if self.window.lead_share + self.window.tail_share > 1.0 {
            return Err(TokenwrightError::validation(
                "window.tail_share",
                "lead_share + tail_share must not exceed 1",
            ));
        }
        if self.optimizer.window_ratio < 1.0 {
            return Err(TokenwrightError::validation(
                "optimizer.window_ratio",
                "must be at least 1",
            ));
        }
        if self.chunker.chunk_size == 0 {
            return Err(TokenwrightError::validation(
                "chunker.chunk_size",
                "must be greater than 0",
            ));
        }
        if self.chunker.overlap >= self.chunker.chunk_size {
            return Err(TokenwrightError::validation(
                "chunker.overlap",
                "must be less than chunk_size",
            ));
        }
        if self.conversation.max_messages == 0 {
            return Err(TokenwrightError::validation(
                "conversation.max_messages",
                "must be greater than 0",
            ));
        }
        let w = &self.conversation.role_weights;
        if w.system <= 0.0 || w.assistant <= 0.0 || w.user <= 0.0 {
            return Err(TokenwrightError::validation(
                "conversation.role_weights",
                "weights must be positive",
            ));
        }
        Ok(())
    }

    /// Merge overrides on top of this config (non-default fields win).
    pub fn merge(&mut self, overrides: Config) {
        let defaults = Config::default();
        if overrides.model != defaults.model {
            self.model = overrides.model;
        }
        if overrides.encoder != defaults.encoder {
            self.encoder = overrides.encoder;
        }
        if overrides.window != defaults.window {
            self.window = overrides.window;
        }
        if overrides.optimizer != defaults.optimizer {
            self.optimizer = overrides.optimizer;
        }
        if overrides.chunker != defaults.chunker {
            self.chunker = overrides.chunker;
        }
        if overrides.batcher != defaults.batcher {
            self.batcher = overrides.batcher;
        }
        if overrides.conversation != defaults.conversation {
            self.conversation = overrides.conversation;
        }
        if overrides.cache != defaults.cache {
            self.cache = overrides.cache;
        }
    }
}

/// Builder for constructing Config with selective overrides.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn with_encoder(mut self, encoder: EncoderKind) -> Self {
        self.config.encoder = encoder;
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.config.conversation.max_messages = max_messages;
        self
    }

    pub fn with_chunking(mut self, chunk_size: usize, overlap: usize) -> Self {
        self.config.chunker = ChunkerConfig {
            chunk_size,
            overlap,
        };
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Discover the config file using standard search order:
/// 1. Explicit path (if provided)
/// 2. ./tokenwright.toml
/// 3. ~/.tokenwright.toml
/// 4. XDG config dir
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        if p.exists() {
            return Some(p.to_path_buf());
        }
        return None;
    }

    let local = PathBuf::from("tokenwright.toml");
    if local.exists() {
        return Some(local);
    }

    if let Some(home) = dirs_home() {
        let home_config = home.join(".tokenwright.toml");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    if let Some(proj_dirs) = ProjectDirs::from("", "", "tokenwright") {
        let xdg = proj_dirs.config_dir().join("tokenwright.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }

    None
}

/// Load the discovered config, or defaults when none exists.
pub fn load_or_default(explicit: Option<&Path>) -> Result<Config> {
    if let Some(p) = explicit {
        if !p.exists() {
            return Err(TokenwrightError::config(format!(
                "config file '{}' does not exist",
                p.display()
            )));
        }
    }
    match find_config_file(explicit) {
        Some(path) => Config::load(&path),
        None => Ok(Config::default()),
    }
}

/// Default cache directory when none is configured.
pub fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("", "", "tokenwright")
        .map(|d| d.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".tokenwright").join("cache"))
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn serde_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str(
            "model = \"claude-3-haiku\"\n[conversation]\nmax_messages = 8\n",
        )
        .unwrap();
        assert_eq!(parsed.model, "claude-3-haiku");
        assert_eq!(parsed.conversation.max_messages, 8);
        assert_eq!(parsed.conversation.role_weights, RoleWeights::default());
        assert_eq!(parsed.optimizer.buffer_tokens, 100);
    }

    #[test]
    fn validation_rejects_overlap_gte_chunk_size() {
        let mut config = Config::default();
        config.chunker.overlap = config.chunker.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.window.relevance_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("window.relevance_threshold"));
    }

    #[test]
    fn validation_rejects_oversubscribed_shares() {
        let mut config = Config::default();
        config.window.lead_share = 0.8;
        config.window.tail_share = 0.3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_with_chunking() {
        let config = ConfigBuilder::new().with_chunking(512, 64).build().unwrap();
        assert_eq!(config.chunker.chunk_size, 512);
        assert!(ConfigBuilder::new().with_chunking(10, 10).build().is_err());
    }

    #[test]
    fn merge_overrides_model() {
        let mut base = Config::default();
        let mut overrides = Config::default();
        overrides.model = "gpt-4o".into();
        base.merge(overrides);
        assert_eq!(base.model, "gpt-4o");
        assert_eq!(base.chunker, ChunkerConfig::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenwright.toml");
        let config = ConfigBuilder::new().with_max_messages(12).build().unwrap();
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let err = load_or_default(Some(Path::new("/nonexistent/tokenwright.toml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
