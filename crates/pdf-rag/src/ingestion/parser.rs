//! Page-aware PDF parser

use lopdf::{Dictionary, Object};
use sha2::{Digest, Sha256};
use std::panic::{self, AssertUnwindSafe};

use crate::error::{Error, Result};
use crate::types::{Page, PageQuality};

/// Ligatures and typographic characters that hurt keyword matching
const REPLACEMENTS: &[(char, &str)] = &[
    ('\u{2010}', "-"),   // Hyphen
    ('\u{2011}', "-"),   // Non-breaking hyphen
    ('\u{2013}', "-"),   // En dash
    ('\u{2014}', "--"),  // Em dash
    ('\u{2018}', "'"),   // Left single quote
    ('\u{2019}', "'"),   // Right single quote
    ('\u{201C}', "\""),  // Left double quote
    ('\u{201D}', "\""),  // Right double quote
    ('\u{2022}', "* "),  // Bullet
    ('\u{2026}', "..."), // Ellipsis
    ('\u{00A0}', " "),   // Non-breaking space
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
];

/// Normalise extracted page text: ASCII approximations, no NULs, trimmed lines
fn cleanup_pdf_text(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\0' {
            continue;
        }
        match REPLACEMENTS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => result.push_str(to),
            None => result.push(c),
        }
    }

    result
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Hash source bytes for the document record
pub fn hash_content(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Parsed document with per-page text and metadata
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Pages 1..=N, empty pages retained
    pub pages: Vec<Page>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub content_hash: String,
}

impl ParsedDocument {
    pub fn empty_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.is_empty()).count()
    }
}

/// Turns an uploaded file into pages
pub trait DocumentParser: Send + Sync {
    fn parse(&self, doc_id: &str, data: &[u8]) -> Result<ParsedDocument>;
}

/// lopdf-backed PDF parser
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfParser;

impl PdfParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_inner(doc_id: &str, data: &[u8]) -> Result<ParsedDocument> {
        if data.is_empty() {
            return Err(Error::parse(doc_id, "empty file"));
        }

        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::parse(doc_id, format!("not a readable PDF: {}", e)))?;

        if doc.is_encrypted() {
            return Err(Error::parse(doc_id, "encrypted PDFs are not supported"));
        }

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        if page_numbers.is_empty() {
            return Err(Error::parse(doc_id, "PDF has no pages"));
        }

        let mut pages = Vec::with_capacity(page_numbers.len());
        for (index, number) in page_numbers.iter().enumerate() {
            // Physical position, not the page label, keeps numbering aligned
            let position = index as u32 + 1;
            match doc.extract_text(&[*number]) {
                Ok(raw) => pages.push(Page::new(position, cleanup_pdf_text(&raw))),
                Err(e) => {
                    tracing::warn!(doc_id, page = position, "page text extraction failed: {}", e);
                    pages.push(Page::failed(position));
                }
            }
        }

        let info = info_dictionary(&doc);
        let title = info.and_then(|d| text_field(d, b"Title"));
        let author = info.and_then(|d| text_field(d, b"Author"));

        Ok(ParsedDocument {
            pages,
            title,
            author,
            content_hash: hash_content(data),
        })
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, doc_id: &str, data: &[u8]) -> Result<ParsedDocument> {
        // lopdf can panic on adversarial xref tables; that is still just a bad file
        let parsed = panic::catch_unwind(AssertUnwindSafe(|| Self::parse_inner(doc_id, data)))
            .map_err(|_| Error::parse(doc_id, "PDF parser panicked on malformed input"))??;

        let empty = parsed.empty_pages();
        let garbled = parsed
            .pages
            .iter()
            .filter(|p| p.quality == PageQuality::Garbled)
            .count();
        tracing::info!(
            doc_id,
            pages = parsed.pages.len(),
            empty_pages = empty,
            garbled_pages = garbled,
            "PDF parsed"
        );
        Ok(parsed)
    }
}

fn info_dictionary(doc: &lopdf::Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn text_field(dict: &Dictionary, key: &[u8]) -> Option<String> {
    let bytes = dict.get(key).ok()?.as_str().ok()?;
    let text = decode_pdf_string(bytes);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// PDF text strings are either UTF-16BE with a BOM or byte strings
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}
