//! Splitting long documents into overlapping, budget-sized chunks.
//!
//! The document is encoded once and a window of `chunk_size` tokens slides
//! over it with stride `chunk_size - overlap`. Each window is decoded and
//! snapped to sentence boundaries where that leaves a non-empty chunk:
//!
//! - a chunk that does not start at token 0 (and does not already start
//!   on a sentence boundary) drops its leading partial sentence;
//! - a chunk that does not end at the final token drops its trailing
//!   partial sentence.
//!
//! `start_token..end_token` always records the raw window. Consecutive
//! windows overlap and together cover every token of the document. They
//! share exactly `overlap` tokens unless a window had to shift by a few
//! tokens to avoid splitting a character in a byte-level vocabulary.
//!
//! When the encoder is unavailable, chunks are assembled from whole
//! segments using the character estimate instead.

use serde::Serialize;
use tracing::{debug, warn};

use crate::segment;
use crate::tokens::{Outcome, TokenCounter, TokenId, CHAR_SPLIT_BACKOFF};

/// One chunk of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    /// First token of the raw window.
    pub start_token: usize,
    /// One past the last token of the raw window.
    pub end_token: usize,
    /// Token count of `text` after boundary cleanup.
    pub token_count: usize,
}

#[derive(Debug, Clone)]
pub struct DocumentChunker {
    counter: TokenCounter,
}

impl DocumentChunker {
    pub fn new(counter: TokenCounter) -> Self {
        Self { counter }
    }

    /// Split `document` into chunks of at most `chunk_size` tokens that
    /// overlap by `overlap` tokens.
    ///
    /// `chunk_size` is raised to 1 and `overlap` clamped below `chunk_size`
    /// so the window always advances.
    pub fn chunk(&self, document: &str, chunk_size: usize, overlap: usize) -> Outcome<Vec<Chunk>> {
        let chunk_size = chunk_size.max(1);
        let overlap = overlap.min(chunk_size - 1);

        match self.counter.encode(document) {
            Ok(tokens) => self.chunk_tokens(document, &tokens, chunk_size, overlap),
            Err(err) => {
                warn!(error = %err, "encoder unavailable, chunking by estimated paragraphs");
                Outcome::degraded(self.chunk_by_segments(document, chunk_size, overlap))
            }
        }
    }

    fn chunk_tokens(
        &self,
        document: &str,
        tokens: &[TokenId],
        chunk_size: usize,
        overlap: usize,
    ) -> Outcome<Vec<Chunk>> {
        let n = tokens.len();
        if n <= chunk_size {
            return Outcome::clean(vec![Chunk {
                index: 0,
                text: document.to_string(),
                start_token: 0,
                end_token: n,
                token_count: n,
            }]);
        }

        let mut chunks = Vec::with_capacity(n / (chunk_size - overlap) + 1);
        let mut start = 0;
        let mut floor = 0;

        loop {
            let Some((start_token, end_token, raw)) =
                self.decodable_window(tokens, start, floor, chunk_size)
            else {
                warn!(start, "no decodable chunk window, chunking by estimated paragraphs");
                return Outcome::degraded(self.chunk_by_segments(document, chunk_size, overlap));
            };
            let lead = start_token > 0 && !self.starts_sentence(tokens, start_token);
            let tail = end_token < n;
            let text = self.snap(&raw, lead, tail, chunk_size);
            let token_count = self.counter.count(&text);
            chunks.push(Chunk {
                index: chunks.len(),
                text,
                start_token,
                end_token,
                token_count,
            });
            if end_token == n {
                break;
            }
            // The next window starts inside this one, so no token is skipped.
            floor = start_token + 1;
            start = end_token.saturating_sub(overlap).max(floor);
        }

        debug!(tokens = n, chunk_size, overlap, chunks = chunks.len(), "chunked document");
        Outcome::clean(chunks)
    }

    /// Token range near `start..start + chunk_size` that decodes.
    ///
    /// Byte-level vocabularies can split a character across tokens. The end
    /// moves back and, if that is not enough, the start moves back (never
    /// below `floor`) until the slice lands on character boundaries. The
    /// range never exceeds `chunk_size` tokens.
    fn decodable_window(
        &self,
        tokens: &[TokenId],
        start: usize,
        floor: usize,
        chunk_size: usize,
    ) -> Option<(usize, usize, String)> {
        let n = tokens.len();
        let lowest = start.saturating_sub(CHAR_SPLIT_BACKOFF).max(floor);
        for s in (lowest..=start).rev() {
            let end = (s + chunk_size).min(n);
            let shortest = end.saturating_sub(CHAR_SPLIT_BACKOFF).max(s + 1);
            for e in (shortest..=end).rev() {
                if let Ok(raw) = self.counter.decode(&tokens[s..e]) {
                    return Some((s, e, raw));
                }
            }
        }
        None
    }

    /// True if the text before `start` closes a sentence.
    fn starts_sentence(&self, tokens: &[TokenId], start: usize) -> bool {
        (1..=start.min(CHAR_SPLIT_BACKOFF))
            .find_map(|k| self.counter.decode(&tokens[start - k..start]).ok())
            .is_some_and(|prev| prev.trim_end().ends_with(['.', '!', '?']))
    }

    /// Drop partial sentences at the chunk edges, keeping the raw window
    /// when cleanup would leave nothing.
    fn snap(&self, raw: &str, lead: bool, tail: bool, chunk_size: usize) -> String {
        let mut text = raw;
        if lead {
            if let Some(i) = segment::first_sentence_end(text) {
                if !text[i..].trim().is_empty() {
                    text = &text[i..];
                }
            }
        }
        if tail {
            if let Some(i) = segment::last_sentence_end(text) {
                if !text[..i].trim().is_empty() {
                    text = &text[..i];
                }
            }
        }

        let snapped = text.trim();
        if !snapped.is_empty() && self.counter.count(snapped) <= chunk_size {
            return snapped.to_string();
        }
        // Re-encoding a decoded slice can merge differently at its edges.
        let raw = raw.trim();
        if self.counter.count(raw) > chunk_size {
            self.counter.truncate(raw, chunk_size).value
        } else {
            raw.to_string()
        }
    }

    /// Encoder-free fallback: accumulate whole segments by estimated size,
    /// carrying trailing segments worth at most `overlap` into the next chunk.
    fn chunk_by_segments(&self, document: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
        let seg = segment::segment(document);
        let estimator = self.counter.fallback();

        let mut units: Vec<&str> = Vec::new();
        for s in &seg.segments {
            let mut rest = s.as_str();
            while !rest.is_empty() {
                let mut piece = estimator.truncate(rest, chunk_size);
                if piece.is_empty() {
                    let first = rest.chars().next().map_or(rest.len(), char::len_utf8);
                    piece = &rest[..first];
                }
                units.push(piece);
                rest = &rest[piece.len()..];
            }
        }
        if units.is_empty() {
            return vec![Chunk {
                index: 0,
                text: document.to_string(),
                start_token: 0,
                end_token: 0,
                token_count: 0,
            }];
        }

        let sizes: Vec<usize> = units.iter().map(|u| estimator.estimate(u)).collect();
        let mut offsets = Vec::with_capacity(units.len() + 1);
        offsets.push(0);
        for s in &sizes {
            offsets.push(offsets[offsets.len() - 1] + s);
        }

        let separator = seg.kind.separator();
        let separator_tokens = estimator.estimate(separator);
        let mut chunks = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut current_tokens = 0;

        let emit = |current: &[usize], chunks: &mut Vec<Chunk>| {
            let text = current
                .iter()
                .map(|&i| units[i])
                .collect::<Vec<_>>()
                .join(separator);
            let (first, last) = (current[0], current[current.len() - 1]);
            chunks.push(Chunk {
                index: chunks.len(),
                token_count: estimator.estimate(&text),
                text,
                start_token: offsets[first],
                end_token: offsets[last + 1],
            });
        };

        // Estimates round up per unit, so the sum of unit and separator
        // estimates bounds the estimate of the joined text.
        for i in 0..units.len() {
            if !current.is_empty() && current_tokens + separator_tokens + sizes[i] > chunk_size {
                emit(&current, &mut chunks);
                let mut carried = 0;
                let mut carry = Vec::new();
                for &j in current.iter().rev() {
                    let joined = if carry.is_empty() { 0 } else { separator_tokens };
                    let with = carried + joined + sizes[j];
                    if with > overlap || with + separator_tokens + sizes[i] > chunk_size {
                        break;
                    }
                    carried = with;
                    carry.push(j);
                }
                carry.reverse();
                current = carry;
                current_tokens = carried;
            }
            if !current.is_empty() {
                current_tokens += separator_tokens;
            }
            current.push(i);
            current_tokens += sizes[i];
        }
        emit(&current, &mut chunks);

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::tests::{broken_counter, byte_counter, MIXED_SCRIPT};

    fn chunker() -> DocumentChunker {
        DocumentChunker::new(TokenCounter::piece())
    }

    #[test]
    fn short_document_is_one_chunk() {
        let chunks = chunker().chunk("Just one sentence.", 50, 5).value;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Just one sentence.");
        assert_eq!(chunks[0].start_token, 0);
    }

    #[test]
    fn three_sentences_small_chunks() {
        let out = chunker().chunk("Sentence one. Sentence two. Sentence three.", 5, 1);
        assert!(!out.degraded);
        let chunks = out.value;
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.token_count <= 5, "{chunk:?}");
            assert!(chunk.end_token - chunk.start_token <= 5);
        }
        for pair in chunks.windows(2) {
            assert!(pair[0].end_token > pair[1].start_token);
        }
    }

    #[test]
    fn token_windows_tile_the_document() {
        let counter = TokenCounter::piece();
        let docs = [
            "Sentence one. Sentence two. Sentence three.".repeat(7),
            "Paragraph about budgets.\n\nAnother one about windows.\n\n".repeat(12),
            "unpunctuated words flowing on and on ".repeat(30),
        ];
        for doc in &docs {
            let tokens = counter.encode(doc).unwrap();
            for (size, overlap) in [(8, 2), (16, 8), (40, 0), (25, 12)] {
                let chunks = chunker().chunk(doc, size, overlap).value;
                assert_eq!(chunks[0].start_token, 0);
                assert_eq!(chunks[chunks.len() - 1].end_token, tokens.len());

                let mut rebuilt: Vec<TokenId> = Vec::new();
                let mut covered = 0;
                for chunk in &chunks {
                    assert!(chunk.start_token <= covered);
                    assert_eq!(covered - chunk.start_token, if covered == 0 { 0 } else { overlap });
                    rebuilt.extend_from_slice(&tokens[covered..chunk.end_token]);
                    covered = chunk.end_token;
                }
                assert_eq!(rebuilt, tokens);
            }
        }
    }

    #[test]
    fn chunks_start_on_sentence_boundaries_when_possible() {
        let doc = "Alpha beta gamma delta. Epsilon zeta eta theta. Iota kappa lambda mu. \
                   Nu xi omicron pi. Rho sigma tau upsilon."
            .to_string();
        let chunks = chunker().chunk(&doc, 20, 6).value;
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_count <= 20);
            assert!(doc.contains(&chunk.text), "{:?} is not a substring", chunk.text);
        }
    }

    #[test]
    fn snap_drops_partial_sentences() {
        let c = chunker();
        assert_eq!(
            c.snap("ta. Delta epsilon zeta. Eta th", true, true, 100),
            "Delta epsilon zeta."
        );
        assert_eq!(c.snap("no terminator here", true, true, 100), "no terminator here");
        assert_eq!(c.snap("Whole sentence. Tail", false, true, 100), "Whole sentence.");
    }

    #[test]
    fn snap_keeps_raw_window_when_nothing_remains() {
        let c = chunker();
        assert_eq!(c.snap("end. ", true, false, 100), "end.");
    }

    #[test]
    fn chunk_size_zero_is_raised() {
        let chunks = chunker().chunk("abc def ghi", 0, 0).value;
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.end_token - c.start_token == 1));
    }

    #[test]
    fn broken_encoder_falls_back_to_paragraphs() {
        let c = DocumentChunker::new(broken_counter());
        let doc = (0..12)
            .map(|i| format!("Paragraph number {i} with a few words."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let out = c.chunk(&doc, 30, 10);
        assert!(out.degraded);
        let chunks = out.value;
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_count <= 30, "{chunk:?}");
            assert!(chunk.end_token - chunk.start_token <= 30, "{chunk:?}");
        }
        for pair in chunks.windows(2) {
            assert!(pair[0].end_token > pair[1].start_token);
            let last_para = pair[0].text.rsplit("\n\n").next().unwrap();
            assert!(pair[1].text.starts_with(last_para));
        }
    }

    #[test]
    fn carried_overlap_never_pushes_a_chunk_over_size() {
        let c = DocumentChunker::new(broken_counter());
        // Estimated at 10, 25 and 10 tokens.
        let doc = format!("{}\n\n{}\n\n{}", "a".repeat(40), "b".repeat(100), "c".repeat(40));
        let chunks = c.chunk(&doc, 30, 10).value;
        for chunk in &chunks {
            assert!(chunk.token_count <= 30, "{chunk:?}");
            assert!(chunk.end_token - chunk.start_token <= 30, "{chunk:?}");
        }
        for para in doc.split("\n\n") {
            assert!(chunks.iter().any(|ch| ch.text.contains(para)));
        }
    }

    #[test]
    fn split_characters_never_leave_gaps() {
        let counter = byte_counter();
        let doc = MIXED_SCRIPT.repeat(12);
        let n = counter.encode(&doc).unwrap().len();
        let c = DocumentChunker::new(counter);
        for (size, overlap) in [(5, 0), (7, 2), (16, 4), (30, 10), (64, 63)] {
            let out = c.chunk(&doc, size, overlap);
            assert!(!out.degraded, "size {size}");
            let chunks = out.value;
            assert_eq!(chunks[0].start_token, 0);
            assert_eq!(chunks[chunks.len() - 1].end_token, n);
            for pair in chunks.windows(2) {
                assert!(pair[1].start_token > pair[0].start_token);
                assert!(pair[1].start_token <= pair[0].end_token, "gap after {:?}", pair[0]);
            }
            for chunk in &chunks {
                assert!(chunk.end_token - chunk.start_token <= size);
                assert!(chunk.token_count <= size, "{chunk:?}");
                assert!(doc.contains(&chunk.text));
            }
        }
    }

    #[test]
    fn broken_encoder_splits_oversized_segment() {
        let c = DocumentChunker::new(broken_counter());
        let out = c.chunk(&"x".repeat(400), 20, 0);
        assert!(out.degraded);
        assert_eq!(out.value.len(), 5);
        assert!(out.value.iter().all(|ch| ch.token_count == 20));
    }
}
