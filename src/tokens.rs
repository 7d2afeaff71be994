//! Token counting and truncation for context budgeting.
//!
//! All token arithmetic in the crate goes through [`TokenCounter`], which
//! wraps a pluggable [`Encoder`]. Two encoders ship with the crate:
//!
//! - [`PieceEncoder`]: dependency-free and lossless, splits text into word,
//!   punctuation and whitespace pieces and packs each piece into tokens of
//!   at most three bytes. Deterministic across platforms, so tests use it.
//! - `TiktokenEncoder` (feature `tiktoken`): the BPE vocabularies used by
//!   OpenAI models, and a close approximation for Claude.
//!
//! When the encoder fails, the counter degrades to a character heuristic
//! ([`CharEstimator`]) and reports it through [`Outcome::degraded`] instead
//! of returning an error.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TokenwrightError};

/// A single token id in an encoder's vocabulary.
pub type TokenId = u32;

// ---------------------------------------------------------------------------
// Outcome (value + degradation flag)
// ---------------------------------------------------------------------------

/// A value produced by a best-effort operation.
///
/// `degraded` is set when any part of the computation had to fall back to
/// the character heuristic because the encoder failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    pub degraded: bool,
}

impl<T> Outcome<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            degraded: false,
        }
    }

    pub fn degraded(value: T) -> Self {
        Self {
            value,
            degraded: true,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            degraded: self.degraded,
        }
    }

    /// Mark this outcome degraded if `other` was.
    pub fn absorb(mut self, other: bool) -> Self {
        self.degraded |= other;
        self
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

// ---------------------------------------------------------------------------
// Encoder trait (extensibility point)
// ---------------------------------------------------------------------------

/// Converts text to token ids and back.
///
/// Implementations must be deterministic for a fixed vocabulary and safe to
/// share across threads; the crate holds a single instance per model.
pub trait Encoder: Send + Sync {
    /// Name of the vocabulary, e.g. `cl100k_base`.
    fn name(&self) -> &str;

    fn encode(&self, text: &str) -> Result<Vec<TokenId>>;

    fn decode(&self, tokens: &[TokenId]) -> Result<String>;
}

/// Which encoder to construct for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    /// Pick the best available encoder for the model family.
    #[default]
    Auto,
    /// The built-in [`PieceEncoder`].
    Piece,
    /// `cl100k_base` BPE (feature `tiktoken`).
    Cl100k,
    /// `o200k_base` BPE (feature `tiktoken`).
    O200k,
}

impl EncoderKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "piece" => Some(Self::Piece),
            "cl100k" | "cl100k_base" => Some(Self::Cl100k),
            "o200k" | "o200k_base" => Some(Self::O200k),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Piece encoder
// ---------------------------------------------------------------------------

static PIECE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r" ?[\p{L}\p{N}_]+| ?[^\s\p{L}\p{N}_]+|\s+").expect("piece pattern is valid")
});

/// How many tokens a cut may move to land on a character boundary in
/// byte-level vocabularies.
pub(crate) const CHAR_SPLIT_BACKOFF: usize = 8;

/// Bytes packed into a single piece token.
const PIECE_BYTES: usize = 3;
/// Tag in the high byte of ids that carry a whole 4-byte character.
const WIDE_TAG: u32 = 4;

/// Built-in subword encoder.
///
/// Token ids are self-describing: the high byte holds the byte length
/// (1-3) and the low 24 bits the bytes themselves, or tag 4 with a Unicode
/// scalar for characters that need four bytes. Tokens never split a
/// character, so every prefix of a token sequence decodes to valid UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct PieceEncoder;

impl PieceEncoder {
    fn push_piece(piece: &str, out: &mut Vec<TokenId>) {
        let mut buf = [0u8; PIECE_BYTES];
        let mut len = 0usize;

        for ch in piece.chars() {
            let width = ch.len_utf8();
            if width > PIECE_BYTES {
                if len > 0 {
                    out.push(pack(&buf[..len]));
                    len = 0;
                }
                out.push((WIDE_TAG << 24) | ch as u32);
                continue;
            }
            if len + width > PIECE_BYTES {
                out.push(pack(&buf[..len]));
                len = 0;
            }
            ch.encode_utf8(&mut buf[len..]);
            len += width;
        }

        if len > 0 {
            out.push(pack(&buf[..len]));
        }
    }
}

fn pack(bytes: &[u8]) -> TokenId {
    let mut id = (bytes.len() as u32) << 24;
    for (i, b) in bytes.iter().enumerate() {
        id |= (*b as u32) << (16 - 8 * i);
    }
    id
}

impl Encoder for PieceEncoder {
    fn name(&self) -> &str {
        "piece"
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        let mut out = Vec::with_capacity(text.len() / 2);
        for m in PIECE_PATTERN.find_iter(text) {
            Self::push_piece(m.as_str(), &mut out);
        }
        Ok(out)
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String> {
        let mut bytes = Vec::with_capacity(tokens.len() * PIECE_BYTES);
        for &id in tokens {
            match id >> 24 {
                len @ 1..=3 => {
                    for i in 0..len as usize {
                        bytes.push(((id >> (16 - 8 * i)) & 0xFF) as u8);
                    }
                }
                WIDE_TAG => {
                    let ch = char::from_u32(id & 0x00FF_FFFF).ok_or_else(|| {
                        TokenwrightError::encoding(format!("token {id:#x} is not a valid scalar"))
                    })?;
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
                _ => {
                    return Err(TokenwrightError::encoding(format!(
                        "token {id:#x} is outside the piece vocabulary"
                    )))
                }
            }
        }
        String::from_utf8(bytes)
            .map_err(|e| TokenwrightError::encoding(format!("decoded bytes are not UTF-8: {e}")))
    }
}

// ---------------------------------------------------------------------------
// tiktoken encoder
// ---------------------------------------------------------------------------

/// BPE encoder backed by `tiktoken-rs`.
#[cfg(feature = "tiktoken")]
pub struct TiktokenEncoder {
    bpe: tiktoken_rs::CoreBPE,
    name: &'static str,
}

#[cfg(feature = "tiktoken")]
impl TiktokenEncoder {
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| TokenwrightError::encoding(format!("loading cl100k_base: {e}")))?;
        Ok(Self {
            bpe,
            name: "cl100k_base",
        })
    }

    pub fn o200k() -> Result<Self> {
        let bpe = tiktoken_rs::o200k_base()
            .map_err(|e| TokenwrightError::encoding(format!("loading o200k_base: {e}")))?;
        Ok(Self {
            bpe,
            name: "o200k_base",
        })
    }

    /// o200k for the GPT-4o family, cl100k for everything else.
    pub fn for_model(model: &str) -> Result<Self> {
        match parse_model(model) {
            ModelFamily::Gpt4o => Self::o200k(),
            _ => Self::cl100k(),
        }
    }
}

#[cfg(feature = "tiktoken")]
impl Encoder for TiktokenEncoder {
    fn name(&self) -> &str {
        self.name
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        Ok(self
            .bpe
            .encode_with_special_tokens(text)
            .into_iter()
            .map(|t| t as TokenId)
            .collect())
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String> {
        self.bpe
            .decode(tokens.iter().map(|&t| t as _).collect())
            .map_err(|e| TokenwrightError::encoding(format!("{} decode failed: {e}", self.name)))
    }
}

/// Build the encoder for `model`.
///
/// Falls back to [`PieceEncoder`] when the requested vocabulary cannot be
/// loaded or the `tiktoken` feature is disabled.
pub fn encoder_for_model(model: &str, kind: EncoderKind) -> Arc<dyn Encoder> {
    match kind {
        EncoderKind::Piece => Arc::new(PieceEncoder),
        #[cfg(feature = "tiktoken")]
        EncoderKind::Cl100k => load_or_piece(TiktokenEncoder::cl100k()),
        #[cfg(feature = "tiktoken")]
        EncoderKind::O200k => load_or_piece(TiktokenEncoder::o200k()),
        #[cfg(feature = "tiktoken")]
        EncoderKind::Auto => match parse_model(model) {
            ModelFamily::Unknown => Arc::new(PieceEncoder),
            _ => load_or_piece(TiktokenEncoder::for_model(model)),
        },
        #[cfg(not(feature = "tiktoken"))]
        other => {
            if other != EncoderKind::Auto {
                warn!(model, ?other, "tiktoken feature disabled, using piece encoder");
            }
            Arc::new(PieceEncoder)
        }
    }
}

#[cfg(feature = "tiktoken")]
fn load_or_piece(loaded: Result<TiktokenEncoder>) -> Arc<dyn Encoder> {
    match loaded {
        Ok(encoder) => Arc::new(encoder),
        Err(err) => {
            warn!(error = %err, "falling back to piece encoder");
            Arc::new(PieceEncoder)
        }
    }
}

// ---------------------------------------------------------------------------
// Model families & character heuristic
// ---------------------------------------------------------------------------

/// Known model families with tuned character-per-token ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// GPT-4 and GPT-4 Turbo (~4 chars/token).
    Gpt4,
    /// GPT-4o and the o-series reasoning models.
    Gpt4o,
    /// GPT-3.5 Turbo (~4 chars/token).
    Gpt35,
    /// Anthropic Claude models (~3.5 chars/token).
    Claude,
    /// Unknown model; assumes 4 chars per token.
    Unknown,
}

impl ModelFamily {
    /// Default characters-per-token ratio for this model family.
    pub fn chars_per_token(self) -> f64 {
        match self {
            Self::Gpt4 | Self::Gpt4o | Self::Gpt35 | Self::Unknown => 4.0,
            Self::Claude => 3.5,
        }
    }
}

/// Parse a model name string into a [`ModelFamily`].
pub fn parse_model(name: &str) -> ModelFamily {
    let lower = name.to_lowercase();
    if lower.contains("claude") {
        ModelFamily::Claude
    } else if lower.contains("gpt-4o")
        || lower.contains("gpt4o")
        || lower.starts_with("o1")
        || lower.starts_with("o3")
    {
        ModelFamily::Gpt4o
    } else if lower.contains("gpt-4") || lower.contains("gpt4") {
        ModelFamily::Gpt4
    } else if lower.contains("gpt-3") || lower.contains("gpt3") {
        ModelFamily::Gpt35
    } else {
        ModelFamily::Unknown
    }
}

/// Token estimator that uses a character-count heuristic.
///
/// This is the degradation path: it is used only when the encoder fails.
#[derive(Debug, Clone, Copy)]
pub struct CharEstimator {
    chars_per_token: f64,
}

impl CharEstimator {
    pub fn new(model: ModelFamily) -> Self {
        Self {
            chars_per_token: model.chars_per_token(),
        }
    }

    pub fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let chars = text.chars().count() as f64;
        (chars / self.chars_per_token).ceil() as usize
    }

    /// Longest prefix of `text` whose estimate is within `max_tokens`.
    pub fn truncate<'a>(&self, text: &'a str, max_tokens: usize) -> &'a str {
        let max_chars = (max_tokens as f64 * self.chars_per_token).floor() as usize;
        match text.char_indices().nth(max_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }
}

impl Default for CharEstimator {
    fn default() -> Self {
        Self::new(ModelFamily::Unknown)
    }
}

// ---------------------------------------------------------------------------
// Token counter
// ---------------------------------------------------------------------------

/// Counts and truncates text against a token budget.
///
/// Cheap to clone; the encoder is shared.
#[derive(Clone)]
pub struct TokenCounter {
    encoder: Arc<dyn Encoder>,
    fallback: CharEstimator,
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoder", &self.encoder.name())
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl TokenCounter {
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self {
            encoder,
            fallback: CharEstimator::default(),
        }
    }

    /// Counter over the built-in [`PieceEncoder`].
    pub fn piece() -> Self {
        Self::new(Arc::new(PieceEncoder))
    }

    /// Counter for a model name, with the fallback ratio tuned to its family.
    pub fn for_model(model: &str, kind: EncoderKind) -> Self {
        Self::new(encoder_for_model(model, kind))
            .with_fallback(CharEstimator::new(parse_model(model)))
    }

    pub fn with_fallback(mut self, fallback: CharEstimator) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn encoder_name(&self) -> &str {
        self.encoder.name()
    }

    /// Number of tokens in `text`; 0 for empty input.
    pub fn count(&self, text: &str) -> usize {
        self.count_checked(text).value
    }

    pub fn count_checked(&self, text: &str) -> Outcome<usize> {
        if text.is_empty() {
            return Outcome::clean(0);
        }
        match self.encoder.encode(text) {
            Ok(tokens) => Outcome::clean(tokens.len()),
            Err(err) => {
                warn!(encoder = self.encoder.name(), error = %err, "token count degraded to char estimate");
                Outcome::degraded(self.fallback.estimate(text))
            }
        }
    }

    /// Return `text` cut down to at most `max_tokens` tokens.
    ///
    /// Never fails: when the encoder cannot encode `text`, the character
    /// heuristic picks the cut point and the outcome is marked degraded.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> Outcome<String> {
        if text.is_empty() {
            return Outcome::clean(String::new());
        }
        let tokens = match self.encoder.encode(text) {
            Ok(tokens) => tokens,
            Err(err) => return self.truncate_fallback(text, max_tokens, &err),
        };
        if tokens.len() <= max_tokens {
            return Outcome::clean(text.to_string());
        }
        Outcome::clean(self.decode_prefix(&tokens, max_tokens))
    }

    /// Longest prefix of `tokens` (at most `max_tokens` of them) that decodes
    /// and re-counts within `max_tokens`.
    ///
    /// Byte-level vocabularies can split a character across tokens, so the
    /// cut moves back until it lands on a character boundary. The empty
    /// prefix always qualifies.
    fn decode_prefix(&self, tokens: &[TokenId], max_tokens: usize) -> String {
        let mut failures = 0;
        for cut in (1..=max_tokens.min(tokens.len())).rev() {
            match self.encoder.decode(&tokens[..cut]) {
                Ok(prefix) if self.count(&prefix) <= max_tokens => return prefix,
                Ok(_) => {}
                Err(_) => failures += 1,
            }
        }
        if failures > CHAR_SPLIT_BACKOFF {
            warn!(
                encoder = self.encoder.name(),
                max_tokens, failures, "no decodable prefix; truncated to nothing"
            );
        }
        String::new()
    }

    fn truncate_fallback(
        &self,
        text: &str,
        max_tokens: usize,
        err: &TokenwrightError,
    ) -> Outcome<String> {
        warn!(
            encoder = self.encoder.name(),
            error = %err,
            max_tokens,
            "truncation degraded to char estimate"
        );
        Outcome::degraded(self.fallback.truncate(text, max_tokens).to_string())
    }

    pub fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        self.encoder.encode(text)
    }

    pub fn decode(&self, tokens: &[TokenId]) -> Result<String> {
        self.encoder.decode(tokens)
    }

    /// Heuristic estimate, independent of the encoder.
    pub fn estimate(&self, text: &str) -> usize {
        self.fallback.estimate(text)
    }

    pub fn fallback(&self) -> &CharEstimator {
        &self.fallback
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::piece()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encoder that always fails, for exercising degradation paths.
    pub(crate) struct BrokenEncoder;

    impl Encoder for BrokenEncoder {
        fn name(&self) -> &str {
            "broken"
        }

        fn encode(&self, _text: &str) -> Result<Vec<TokenId>> {
            Err(TokenwrightError::encoding("vocabulary missing"))
        }

        fn decode(&self, _tokens: &[TokenId]) -> Result<String> {
            Err(TokenwrightError::encoding("vocabulary missing"))
        }
    }

    pub(crate) fn broken_counter() -> TokenCounter {
        TokenCounter::new(Arc::new(BrokenEncoder))
    }

    /// One token per UTF-8 byte. Slices that split a character fail to
    /// decode, like byte-level BPE vocabularies.
    pub(crate) struct ByteEncoder;

    impl Encoder for ByteEncoder {
        fn name(&self) -> &str {
            "bytes"
        }

        fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
            Ok(text.bytes().map(TokenId::from).collect())
        }

        fn decode(&self, tokens: &[TokenId]) -> Result<String> {
            let bytes: Vec<u8> = tokens.iter().map(|&t| t as u8).collect();
            String::from_utf8(bytes)
                .map_err(|e| TokenwrightError::encoding(format!("split character: {e}")))
        }
    }

    pub(crate) fn byte_counter() -> TokenCounter {
        TokenCounter::new(Arc::new(ByteEncoder))
    }

    pub(crate) const MIXED_SCRIPT: &str =
        "日本語の文章です。これはテストです。\n\nCafé crème, naïve déjà vu 🚀🎉.\n\n";

    #[test]
    fn empty_string_is_zero_tokens() {
        assert_eq!(TokenCounter::piece().count(""), 0);
        assert_eq!(broken_counter().count(""), 0);
    }

    #[test]
    fn piece_encoder_splits_words_into_three_byte_tokens() {
        let counter = TokenCounter::piece();
        // "Sen" "ten" "ce"
        assert_eq!(counter.count("Sentence"), 3);
        // " on" "e" "."
        assert_eq!(counter.count(" one."), 3);
        assert_eq!(counter.count("a"), 1);
    }

    #[test]
    fn piece_encoder_is_lossless() {
        let encoder = PieceEncoder;
        let samples = [
            "Hello, world!",
            "  leading and trailing  \n\n",
            "naïve café … déjà vu",
            "emoji 🎉🎊 inside",
            "tabs\tand\r\nwindows newlines",
        ];
        for text in samples {
            let tokens = encoder.encode(text).unwrap();
            assert_eq!(encoder.decode(&tokens).unwrap(), text);
        }
    }

    #[test]
    fn piece_encoder_prefixes_decode_cleanly() {
        let encoder = PieceEncoder;
        let text = "Über 🎉 straße, ok";
        let tokens = encoder.encode(text).unwrap();
        for end in 0..=tokens.len() {
            let prefix = encoder.decode(&tokens[..end]).unwrap();
            assert!(text.starts_with(&prefix));
        }
    }

    #[test]
    fn piece_decode_rejects_foreign_ids() {
        assert!(PieceEncoder.decode(&[0xFF00_0000]).is_err());
    }

    #[test]
    fn count_is_deterministic() {
        let counter = TokenCounter::piece();
        let text = "The quick brown fox jumps over the lazy dog.";
        assert_eq!(counter.count(text), counter.count(text));
    }

    #[test]
    fn truncate_within_limit_is_unchanged() {
        let counter = TokenCounter::piece();
        let out = counter.truncate("short text", 100);
        assert_eq!(out, Outcome::clean("short text".to_string()));
    }

    #[test]
    fn truncate_cuts_to_exact_budget() {
        let counter = TokenCounter::piece();
        let text = "A".repeat(300);
        let out = counter.truncate(&text, 10);
        assert!(!out.degraded);
        assert_eq!(counter.count(&out.value), 10);
        assert!(text.starts_with(&out.value));
    }

    #[test]
    fn broken_encoder_degrades_count() {
        let counter = broken_counter();
        let out = counter.count_checked("abcdefgh");
        assert!(out.degraded);
        assert_eq!(out.value, 2);
    }

    #[test]
    fn broken_encoder_degrades_truncate() {
        let counter = broken_counter();
        let out = counter.truncate(&"x".repeat(100), 5);
        assert!(out.degraded);
        assert_eq!(out.value.len(), 20);
    }

    #[test]
    fn truncate_backs_off_split_characters() {
        let counter = byte_counter();
        let text = MIXED_SCRIPT.repeat(4);
        for max in 1..120 {
            let out = counter.truncate(&text, max);
            assert!(!out.degraded, "max {max}");
            let used = counter.count(&out.value);
            assert!(used <= max, "max {max}, got {used}");
            // A character is at most four bytes.
            assert!(max - used < 4, "max {max}, got {used}");
            assert!(text.starts_with(&out.value));
        }
    }

    #[test]
    fn char_estimator_rounds_up() {
        let est = CharEstimator::new(ModelFamily::Gpt4);
        assert_eq!(est.estimate("0123456789"), 3);
        let claude = CharEstimator::new(ModelFamily::Claude);
        assert_eq!(claude.estimate("abcdefghijklmnopqrstu"), 6);
    }

    #[test]
    fn char_estimator_truncate_respects_char_boundaries() {
        let est = CharEstimator::default();
        let text = "ééééééééé";
        let cut = est.truncate(text, 1);
        assert_eq!(cut.chars().count(), 4);
        assert!(est.estimate(cut) <= 1);
    }

    #[test]
    fn parse_model_recognises_variants() {
        assert_eq!(parse_model("gpt-4"), ModelFamily::Gpt4);
        assert_eq!(parse_model("gpt-4-turbo"), ModelFamily::Gpt4);
        assert_eq!(parse_model("gpt-4o-mini"), ModelFamily::Gpt4o);
        assert_eq!(parse_model("gpt-3.5-turbo"), ModelFamily::Gpt35);
        assert_eq!(parse_model("claude-3-opus"), ModelFamily::Claude);
        assert_eq!(parse_model("llama-70b"), ModelFamily::Unknown);
    }

    #[test]
    fn encoder_kind_parse() {
        assert_eq!(EncoderKind::parse("piece"), Some(EncoderKind::Piece));
        assert_eq!(EncoderKind::parse("cl100k_base"), Some(EncoderKind::Cl100k));
        assert_eq!(EncoderKind::parse("bogus"), None);
    }

    #[test]
    fn unknown_model_auto_uses_piece_encoder() {
        let encoder = encoder_for_model("llama-70b", EncoderKind::Auto);
        assert_eq!(encoder.name(), "piece");
    }

    #[cfg(feature = "tiktoken")]
    #[test]
    fn tiktoken_truncate_stays_within_budget_on_multibyte_text() {
        for encoder in [TiktokenEncoder::cl100k().unwrap(), TiktokenEncoder::o200k().unwrap()] {
            let counter = TokenCounter::new(Arc::new(encoder));
            let text = MIXED_SCRIPT.repeat(30);
            for max in 1..80 {
                let out = counter.truncate(&text, max);
                assert!(!out.degraded, "{} max {max}", counter.encoder_name());
                assert!(counter.count(&out.value) <= max, "{} max {max}", counter.encoder_name());
                assert!(text.starts_with(&out.value));
            }
        }
    }

    #[cfg(feature = "tiktoken")]
    #[test]
    fn tiktoken_round_trips_plain_text() {
        let encoder = TiktokenEncoder::cl100k().unwrap();
        let text = "Token budgets are shared between history and documents.";
        let tokens = encoder.encode(text).unwrap();
        assert!(!tokens.is_empty());
        assert_eq!(encoder.decode(&tokens).unwrap(), text);
    }
}
