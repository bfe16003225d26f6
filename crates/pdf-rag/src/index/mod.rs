//! Per-document vector and keyword indices

mod keyword;
mod manager;
mod vector;

pub use keyword::{fts_query, KeywordHit, KeywordIndex};
pub use manager::{validate_doc_id, BuildInput, IndexGeneration, IndexManager, IngestPermit};
pub use vector::{VectorHit, VectorIndex};
