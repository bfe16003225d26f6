//! Document ingestion: PDF parsing and token-aware chunking

mod chunker;
mod parser;
mod tokenizer;

pub use chunker::TextChunker;
pub use parser::{hash_content, DocumentParser, ParsedDocument, PdfParser};
pub use tokenizer::{HfTokenizer, TokenCounter, WordTokenizer};
