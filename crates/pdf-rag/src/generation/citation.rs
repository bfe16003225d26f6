//! Citation marker parsing and resolution
//!
//! The model cites pages with markers of the form `[Doc: p. <page>]`. Parsing
//! is a small hand-written scanner over that one grammar, tolerant of extra
//! whitespace and letter case. Anything that does not fit the grammar is
//! ignored rather than treated as an error.

use crate::retrieval::RankedPassage;
use crate::types::response::Citation;

/// A well-formed marker found in generated text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CitationMarker {
    pub page: u32,
    /// Byte range of the marker in the text
    pub start: usize,
    pub end: usize,
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn skip_whitespace(&mut self) {
        while self.bytes.get(self.pos).is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, literal: &str) -> Option<()> {
        let end = self.pos + literal.len();
        let window = self.bytes.get(self.pos..end)?;
        if window.eq_ignore_ascii_case(literal.as_bytes()) {
            self.pos = end;
            Some(())
        } else {
            None
        }
    }

    fn number(&mut self) -> Option<u32> {
        let start = self.pos;
        let mut value: u32 = 0;
        while let Some(b) = self.bytes.get(self.pos).filter(|b| b.is_ascii_digit()) {
            value = value.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
            self.pos += 1;
        }
        (self.pos > start).then_some(value)
    }

    /// `[ Doc : p . <int> ]` starting at the current position
    fn marker(&mut self) -> Option<u32> {
        self.expect("[")?;
        self.skip_whitespace();
        self.expect("doc")?;
        self.skip_whitespace();
        self.expect(":")?;
        self.skip_whitespace();
        self.expect("p")?;
        self.skip_whitespace();
        self.expect(".")?;
        self.skip_whitespace();
        let page = self.number()?;
        self.skip_whitespace();
        self.expect("]")?;
        Some(page)
    }
}

/// Every well-formed marker in `text`, in order of appearance
pub fn parse_markers(text: &str) -> Vec<CitationMarker> {
    let bytes = text.as_bytes();
    let mut markers = Vec::new();
    let mut from = 0;

    while let Some(offset) = bytes[from..].iter().position(|b| *b == b'[') {
        let start = from + offset;
        let mut scanner = Scanner { bytes, pos: start };
        match scanner.marker() {
            Some(page) if page > 0 => {
                markers.push(CitationMarker {
                    page,
                    start,
                    end: scanner.pos,
                });
                from = scanner.pos;
            }
            _ => from = start + 1,
        }
    }

    markers
}

/// Resolve markers in `answer` against the passages the model was shown
///
/// One citation per distinct cited page, in order of first appearance. When
/// several passages share a page, the one with the highest rerank score wins,
/// and among equals the one ranked earlier. Pages the model was never shown
/// are dropped.
pub fn resolve_citations(answer: &str, passages: &[RankedPassage]) -> Vec<Citation> {
    let mut citations: Vec<Citation> = Vec::new();

    for marker in parse_markers(answer) {
        if citations.iter().any(|c| c.page == marker.page) {
            continue;
        }
        let best = passages
            .iter()
            .filter(|p| p.chunk.page == marker.page)
            .reduce(|best, p| if p.score > best.score { p } else { best });

        match best {
            Some(passage) => citations.push(Citation::from_chunk(&passage.chunk)),
            None => tracing::debug!(
                page = marker.page,
                "citation to a page outside the supplied passages"
            ),
        }
    }

    citations
}

/// Shorten passage text for display, cutting on a word boundary
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let budget = max_chars.saturating_sub(3);
    let cut = text
        .char_indices()
        .nth(budget)
        .map_or(text.len(), |(i, _)| i);
    let head = &text[..cut];
    let head = match head.rfind(char::is_whitespace) {
        Some(space) if space > cut / 2 => &head[..space],
        _ => head,
    };
    format!("{}...", head.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn passage(chunk_id: u32, page: u32, score: f32) -> RankedPassage {
        RankedPassage {
            chunk: Chunk {
                chunk_id,
                doc_id: "doc".into(),
                page,
                char_start: chunk_id as usize * 10,
                char_end: chunk_id as usize * 10 + 5,
                token_count: 1,
                text: format!("chunk {}", chunk_id),
            },
            score,
            fused_score: 0.0,
        }
    }

    fn pages(text: &str) -> Vec<u32> {
        parse_markers(text).iter().map(|m| m.page).collect()
    }

    #[test]
    fn test_parses_canonical_markers() {
        let text = "Revenue rose 25% [Doc: p. 2]. Costs fell [Doc: p. 3].";
        let markers = parse_markers(text);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].page, 2);
        assert_eq!(&text[markers[0].start..markers[0].end], "[Doc: p. 2]");
    }

    #[test]
    fn test_tolerates_whitespace_and_case() {
        assert_eq!(pages("[doc:p.7] [ DOC :  p .  12 ]"), vec![7, 12]);
    }

    #[test]
    fn test_ignores_malformed_markers() {
        assert_eq!(pages("[Doc: p. ] [Doc: page 3] [Doc p. 4] [Doc: p. x]"), Vec::<u32>::new());
        assert_eq!(pages("[Doc: p. 0]"), Vec::<u32>::new());
        assert_eq!(pages("[Doc: p. 99999999999]"), Vec::<u32>::new());
        assert_eq!(pages("unterminated [Doc: p. 5"), Vec::<u32>::new());
        assert_eq!(pages("[[Doc: p. 5]]"), vec![5]);
        assert_eq!(pages("ünïcödé [Doc: p. 1] ✓"), vec![1]);
    }

    #[test]
    fn test_resolution_prefers_highest_score_on_page() {
        let passages = vec![passage(4, 2, 0.9), passage(1, 2, 0.95), passage(9, 5, 0.4)];
        let citations =
            resolve_citations("A [Doc: p. 2]. B [Doc: p. 5]. C [Doc: p. 2].", &passages);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].page, 2);
        assert_eq!(citations[0].chunk_id, 1);
        assert_eq!(citations[1].chunk_id, 9);
        assert_eq!(citations[0].char_start, 10);
    }

    #[test]
    fn test_equal_scores_prefer_earlier_passage() {
        let passages = vec![passage(3, 1, 0.5), passage(2, 1, 0.5)];
        let citations = resolve_citations("[Doc: p. 1]", &passages);
        assert_eq!(citations[0].chunk_id, 3);
    }

    #[test]
    fn test_unknown_pages_are_dropped() {
        let passages = vec![passage(0, 1, 0.9)];
        assert!(resolve_citations("Made up [Doc: p. 40].", &passages).is_empty());
        assert!(resolve_citations("No markers at all.", &passages).is_empty());
    }

    #[test]
    fn test_truncate_snippet() {
        assert_eq!(truncate_snippet("  short  ", 300), "short");

        let long = "word ".repeat(100);
        let cut = truncate_snippet(&long, 50);
        assert!(cut.chars().count() <= 50);
        assert!(cut.ends_with("word..."));

        let unicode = "é".repeat(400);
        assert_eq!(truncate_snippet(&unicode, 300).chars().count(), 300);
    }
}
