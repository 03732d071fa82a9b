//! Domain types shared by ingestion, indexing and retrieval.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub type ChunkId = String;
pub type DocumentId = String;

/// How the raw bytes of a source file were turned into text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    /// Invalid UTF-8 sequences were replaced with U+FFFD.
    Utf8Lossy,
}

/// One loaded source file. Discarded after chunking.
///
/// - `id`: path relative to the corpus root, `/`-separated
/// - `source_path`: path of the file as it was read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocumentId,
    pub source_path: PathBuf,
    pub raw_text: String,
    pub encoding: Encoding,
}

/// A bounded slice of a document and the unit of retrieval.
///
/// Offsets count characters, not bytes: `text` equals the characters
/// `start_offset..end_offset` of the parent document's `raw_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub source_path: String,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub sequence_index: usize,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

/// A chunk returned by similarity search. Higher `score` is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: ChunkId,
    pub text: String,
    pub score: f32,
    pub source_path: String,
    pub sequence_index: usize,
}

/// Top-k search results, best match first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    hits: Vec<RetrievedChunk>,
}

impl RetrievedContext {
    /// Sorts by descending score; ties break on chunk id so the order is stable.
    pub fn from_unsorted(mut hits: Vec<RetrievedChunk>, k: usize) -> Self {
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Self { hits }
    }

    pub fn hits(&self) -> &[RetrievedChunk] {
        &self.hits
    }

    pub fn into_hits(self) -> Vec<RetrievedChunk> {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}
