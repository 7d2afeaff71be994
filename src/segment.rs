//! Splitting text into selectable segments.
//!
//! Segmentation falls back from paragraphs (blank lines) to lines to
//! sentences, so it always yields at least one segment for non-blank input,
//! including a single unpunctuated line.

use std::sync::LazyLock;

use regex::Regex;

static BLANK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n").expect("blank line pattern is valid"));

/// Terminal punctuation (with any closing quotes/brackets) followed by whitespace.
static SENTENCE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([.!?]+["'”’)\]]*)\s+"#).expect("sentence pattern is valid")
});

/// Granularity a piece of text was split at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Paragraph,
    Line,
    Sentence,
}

impl SegmentKind {
    /// Separator used to join segments of this kind back together.
    pub fn separator(self) -> &'static str {
        match self {
            Self::Paragraph => "\n\n",
            Self::Line => "\n",
            Self::Sentence => " ",
        }
    }
}

/// Result of [`segment`]: the chosen granularity and the trimmed segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub kind: SegmentKind,
    pub segments: Vec<String>,
}

impl Segmentation {
    pub fn join(&self, indices: impl IntoIterator<Item = usize>) -> String {
        indices
            .into_iter()
            .filter_map(|i| self.segments.get(i).map(String::as_str))
            .collect::<Vec<_>>()
            .join(self.kind.separator())
    }
}

/// Split `content` into paragraphs, lines or sentences, whichever is the
/// coarsest granularity that produces more than one segment.
pub fn segment(content: &str) -> Segmentation {
    let paragraphs = clean(BLANK_LINE.split(content));
    if paragraphs.len() > 1 {
        return Segmentation {
            kind: SegmentKind::Paragraph,
            segments: paragraphs,
        };
    }

    let lines = clean(content.lines());
    if lines.len() > 1 {
        return Segmentation {
            kind: SegmentKind::Line,
            segments: lines,
        };
    }

    Segmentation {
        kind: SegmentKind::Sentence,
        segments: split_sentences(content),
    }
}

/// Split on terminal punctuation followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for caps in SENTENCE_BREAK.captures_iter(text) {
        let (Some(whole), Some(punct)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        pieces.push(&text[start..punct.end()]);
        start = whole.end();
    }
    pieces.push(&text[start..]);
    clean(pieces.into_iter())
}

/// Byte offset where the first complete sentence ends (after its
/// terminator and trailing whitespace), if `text` contains a break.
pub fn first_sentence_end(text: &str) -> Option<usize> {
    SENTENCE_BREAK.find(text).map(|m| m.end())
}

/// Byte offset just past the last sentence terminator in `text`.
///
/// A terminator at the very end of `text` counts even without trailing
/// whitespace.
pub fn last_sentence_end(text: &str) -> Option<usize> {
    let trimmed = text.trim_end();
    if trimmed.ends_with(['.', '!', '?']) {
        return Some(trimmed.len());
    }
    SENTENCE_BREAK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.end()))
        .last()
}

fn clean<'a>(parts: impl Iterator<Item = &'a str>) -> Vec<String> {
    parts
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let seg = segment("First para.\nstill first.\n\nSecond para.\n \nThird.");
        assert_eq!(seg.kind, SegmentKind::Paragraph);
        assert_eq!(seg.segments.len(), 3);
        assert_eq!(seg.segments[0], "First para.\nstill first.");
    }

    #[test]
    fn falls_back_to_lines() {
        let seg = segment("one\ntwo\nthree");
        assert_eq!(seg.kind, SegmentKind::Line);
        assert_eq!(seg.segments, vec!["one", "two", "three"]);
    }

    #[test]
    fn falls_back_to_sentences() {
        let seg = segment("Sentence one. Sentence two! Is it three? Yes.");
        assert_eq!(seg.kind, SegmentKind::Sentence);
        assert_eq!(
            seg.segments,
            vec!["Sentence one.", "Sentence two!", "Is it three?", "Yes."]
        );
    }

    #[test]
    fn unpunctuated_single_line_is_one_segment() {
        let seg = segment("no punctuation at all here");
        assert_eq!(seg.segments, vec!["no punctuation at all here"]);
    }

    #[test]
    fn blank_input_has_no_segments() {
        assert!(segment("   \n\n  ").segments.is_empty());
    }

    #[test]
    fn join_uses_kind_separator() {
        let seg = segment("a\n\nb\n\nc");
        assert_eq!(seg.join([0, 2]), "a\n\nc");
    }

    #[test]
    fn sentence_boundaries() {
        let text = "tail of one. Full sentence two. partial thr";
        let first = first_sentence_end(text).unwrap();
        assert_eq!(&text[first..], "Full sentence two. partial thr");
        let last = last_sentence_end(text).unwrap();
        assert_eq!(&text[..last], "tail of one. Full sentence two.");
        assert_eq!(last_sentence_end("ends here."), Some(10));
        assert_eq!(first_sentence_end("no break"), None);
    }
}
