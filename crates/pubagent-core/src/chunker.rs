//! Recursive character chunker.
//!
//! Text is first cut into pieces on the coarsest separator that occurs
//! (paragraph break, line break, space) and any piece that is still too long
//! is cut again on the next one; the empty separator splits on characters and
//! always succeeds. Pieces are then merged into chunks of at most
//! `chunk_size` characters, each chunk after the first starting exactly
//! `chunk_overlap` characters before the previous one ended.
//!
//! Pieces are bounded by the stride `chunk_size - chunk_overlap`, so any
//! piece fits behind an overlap and the merge never has to cut a piece.

use tracing::debug;

use crate::config::ChunkingSettings;
use crate::error::Result;
use crate::types::{Chunk, Document};

pub const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

pub struct Chunker {
    settings: ChunkingSettings,
}

impl Chunker {
    pub fn new(settings: ChunkingSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn with_sizes(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Self::new(ChunkingSettings { chunk_size, chunk_overlap })
    }

    pub fn split(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            let before = chunks.len();
            chunks.extend(self.split_document(doc));
            debug!(document = %doc.id, chunks = chunks.len() - before, "split document");
        }
        chunks
    }

    pub fn split_document(&self, doc: &Document) -> Vec<Chunk> {
        let text = doc.raw_text.as_str();
        if text.trim().is_empty() {
            return Vec::new();
        }
        let offsets = CharOffsets::new(text);
        let stride = self.settings.chunk_size - self.settings.chunk_overlap;

        let mut pieces = Vec::new();
        split_recursive(&offsets, 0, offsets.char_len(), &SEPARATORS, stride, &mut pieces);

        self.merge(&pieces)
            .into_iter()
            .enumerate()
            .map(|(sequence_index, (start, end))| Chunk {
                id: format!("{}:{}", doc.id, sequence_index),
                document_id: doc.id.clone(),
                source_path: doc.source_path.to_string_lossy().to_string(),
                text: offsets.slice(start, end).to_string(),
                start_offset: start,
                end_offset: end,
                sequence_index,
            })
            .collect()
    }

    /// Merge adjacent pieces (char ranges covering the text) into chunk ranges.
    fn merge(&self, pieces: &[(usize, usize)]) -> Vec<(usize, usize)> {
        let ChunkingSettings { chunk_size, chunk_overlap } = self.settings;
        let mut windows = Vec::new();
        let Some(first) = pieces.first() else { return windows };
        let mut start = first.0;
        let mut i = 0;
        while i < pieces.len() {
            let mut end = start;
            while i < pieces.len() && pieces[i].1 - start <= chunk_size {
                end = pieces[i].1;
                i += 1;
            }
            windows.push((start, end));
            if i == pieces.len() {
                break;
            }
            start = end - chunk_overlap;
        }
        windows
    }
}

/// Char-index to byte-index lookup for one text.
struct CharOffsets<'a> {
    text: &'a str,
    bytes: Vec<usize>,
}

impl<'a> CharOffsets<'a> {
    fn new(text: &'a str) -> Self {
        let mut bytes: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        bytes.push(text.len());
        Self { text, bytes }
    }

    fn char_len(&self) -> usize {
        self.bytes.len() - 1
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.bytes[start]..self.bytes[end]]
    }

    fn char_at_byte(&self, byte: usize) -> usize {
        self.bytes.partition_point(|&b| b < byte)
    }
}

/// Split the char range `start..end` into pieces of at most `limit` chars.
/// Each separator stays attached to the end of the piece it terminates.
fn split_recursive(
    offsets: &CharOffsets<'_>,
    start: usize,
    end: usize,
    separators: &[&str],
    limit: usize,
    out: &mut Vec<(usize, usize)>,
) {
    if end - start <= limit {
        if end > start {
            out.push((start, end));
        }
        return;
    }
    let segment = offsets.slice(start, end);
    let position = separators
        .iter()
        .position(|sep| sep.is_empty() || segment.contains(sep))
        .unwrap_or(separators.len().saturating_sub(1));
    let Some(separator) = separators.get(position) else {
        push_fixed(start, end, limit, out);
        return;
    };
    if separator.is_empty() {
        push_fixed(start, end, limit, out);
        return;
    }
    let finer = &separators[position + 1..];
    let base_byte = offsets.bytes[start];
    let mut piece_start = start;
    for (byte, sep) in segment.match_indices(separator) {
        let piece_end = offsets.char_at_byte(base_byte + byte + sep.len());
        split_recursive(offsets, piece_start, piece_end, finer, limit, out);
        piece_start = piece_end;
    }
    split_recursive(offsets, piece_start, end, finer, limit, out);
}

fn push_fixed(start: usize, end: usize, limit: usize, out: &mut Vec<(usize, usize)>) {
    let mut s = start;
    while s < end {
        let e = (s + limit).min(end);
        out.push((s, e));
        s = e;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pieces(text: &str, limit: usize) -> Vec<String> {
        let offsets = CharOffsets::new(text);
        let mut out = Vec::new();
        split_recursive(&offsets, 0, offsets.char_len(), &SEPARATORS, limit, &mut out);
        out.into_iter().map(|(s, e)| offsets.slice(s, e).to_string()).collect()
    }

    #[test]
    fn paragraphs_are_preferred_over_lines() {
        let p = pieces("aaaa\nbbbb\n\ncccc", 12);
        assert_eq!(p, vec!["aaaa\nbbbb\n\n", "cccc"]);
    }

    #[test]
    fn long_words_fall_back_to_characters() {
        let p = pieces("abcdefghij", 4);
        assert_eq!(p, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let p = pieces("ééééé ññññ", 4);
        assert!(p.iter().all(|s| s.chars().count() <= 4));
        assert_eq!(p.concat(), "ééééé ññññ");
    }
}
