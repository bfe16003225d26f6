//! Document, page and chunk types with source tracking for citations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chunk identifier; sequential in document order, stable within one ingestion
pub type ChunkId = u32;

/// Extraction quality of a page
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PageQuality {
    /// Text extracted normally
    #[default]
    Ok,
    /// No extractable text (blank or scanned page)
    Empty,
    /// Text extracted but mostly unprintable
    Garbled,
    /// The page content stream could not be decoded
    ExtractionFailed,
}

/// One physical page of a PDF
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Page number (1-indexed)
    pub number: u32,
    /// Extracted text
    pub text: String,
    pub quality: PageQuality,
}

impl Page {
    pub fn new(number: u32, text: String) -> Self {
        let quality = assess_quality(&text);
        Self { number, text, quality }
    }

    /// Page with nothing usable, kept so numbering stays aligned
    pub fn failed(number: u32) -> Self {
        Self {
            number,
            text: String::new(),
            quality: PageQuality::ExtractionFailed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

fn assess_quality(text: &str) -> PageQuality {
    let mut total = 0usize;
    let mut bad = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if c == '\u{FFFD}' || c.is_control() {
            bad += 1;
        }
    }

    if total == 0 {
        PageQuality::Empty
    } else if bad * 10 > total * 3 {
        PageQuality::Garbled
    } else {
        PageQuality::Ok
    }
}

/// A token-bounded passage of one page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub doc_id: String,
    /// Source page number (1-indexed)
    pub page: u32,
    /// Byte offset of the first character in the page text
    pub char_start: usize,
    /// Byte offset one past the last character in the page text
    pub char_end: usize,
    pub token_count: usize,
    pub text: String,
}

impl Chunk {
    /// Slice the chunk's range back out of its page text
    pub fn resolve<'a>(&self, page_text: &'a str) -> Option<&'a str> {
        page_text.get(self.char_start..self.char_end)
    }
}

/// A successfully ingested document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Caller-supplied identifier
    pub doc_id: String,
    pub page_count: u32,
    pub chunk_count: u32,
    /// Source file size in bytes
    pub file_size: u64,
    /// SHA-256 of the source bytes
    pub content_hash: String,
    /// Title from the PDF info dictionary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Author from the PDF info dictionary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// First successful ingestion under this doc_id
    pub created_at: DateTime<Utc>,
    /// Most recent successful ingestion
    pub last_ingested: DateTime<Utc>,
    /// Index generation produced by the most recent ingestion
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_quality() {
        assert_eq!(Page::new(1, "  \n ".into()).quality, PageQuality::Empty);
        assert_eq!(Page::new(1, "Revenue rose.".into()).quality, PageQuality::Ok);
        assert_eq!(
            Page::new(1, "\u{FFFD}\u{FFFD}\u{FFFD}a".into()).quality,
            PageQuality::Garbled
        );
        assert_eq!(Page::failed(3).quality, PageQuality::ExtractionFailed);
        assert!(Page::failed(3).is_empty());
    }

    #[test]
    fn test_chunk_resolve() {
        let page = "Alpha beta. Gamma delta.";
        let chunk = Chunk {
            chunk_id: 0,
            doc_id: "d".into(),
            page: 1,
            char_start: 12,
            char_end: 24,
            token_count: 3,
            text: "Gamma delta.".into(),
        };
        assert_eq!(chunk.resolve(page), Some("Gamma delta."));

        let out_of_range = Chunk { char_end: 99, ..chunk };
        assert_eq!(out_of_range.resolve(page), None);
    }
}
