use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use pubagent_core::chunker::Chunker;
use pubagent_core::corpus::{load_documents, CorpusStatus};
use pubagent_core::types::{Chunk, Document, Encoding};
use pubagent_core::Error;

fn doc(id: &str, text: &str) -> Document {
    Document {
        id: id.to_string(),
        source_path: PathBuf::from(format!("/corpus/{id}")),
        raw_text: text.to_string(),
        encoding: Encoding::Utf8,
    }
}

fn txt() -> Vec<String> {
    vec!["txt".to_string()]
}

fn sample_text() -> String {
    let mut text = String::new();
    for p in 0..12 {
        for s in 0..6 {
            text.push_str(&format!("Paragraph {p} sentence {s} talks about solar sails and orbital mechanics. "));
        }
        text.push_str(if p % 3 == 0 { "\n" } else { "\n\n" });
    }
    text.push_str("Averyveryveryverylongunbrokenwordthatneedscharacterlevelsplittingtofitinsideasmallchunk");
    text
}

fn assert_chunk_invariants(text: &str, chunks: &[Chunk], size: usize, overlap: usize) {
    let chars: Vec<char> = text.chars().collect();
    assert!(!chunks.is_empty());
    assert_eq!(chunks[0].start_offset, 0, "coverage starts at the beginning");
    assert_eq!(chunks.last().map(|c| c.end_offset), Some(chars.len()), "coverage reaches the end");
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.sequence_index, i);
        assert!(c.char_len() <= size, "chunk {i} has {} chars", c.char_len());
        assert!(c.char_len() > 0);
        let expected: String = chars[c.start_offset..c.end_offset].iter().collect();
        assert_eq!(c.text, expected, "chunk text matches its offsets");
    }
    for pair in chunks.windows(2) {
        assert_eq!(pair[0].end_offset - pair[1].start_offset, overlap, "exact overlap, no gap");
    }
}

#[test]
fn split_respects_size_and_overlap() {
    let text = sample_text();
    for (size, overlap) in [(1000, 200), (120, 30), (50, 0), (17, 16), (64, 1)] {
        let chunker = Chunker::with_sizes(size, overlap).expect("valid sizes");
        let chunks = chunker.split(&[doc("a.txt", &text)]);
        assert_chunk_invariants(&text, &chunks, size, overlap);
    }
}

#[test]
fn split_is_deterministic() {
    let text = sample_text();
    let chunker = Chunker::with_sizes(200, 40).expect("valid sizes");
    let first = chunker.split(&[doc("a.txt", &text)]);
    let second = chunker.split(&[doc("a.txt", &text)]);
    assert_eq!(first, second);
}

#[test]
fn split_prefers_paragraph_boundaries() {
    let text = "First paragraph is short.\n\nSecond paragraph is also short.\n\nThird one closes.";
    let chunker = Chunker::with_sizes(40, 5).expect("valid sizes");
    let chunks = chunker.split(&[doc("a.txt", text)]);
    assert_chunk_invariants(text, &chunks, 40, 5);
    assert!(chunks[0].text.ends_with("\n\n"), "first chunk ends on the paragraph break: {:?}", chunks[0].text);
}

#[test]
fn small_document_is_one_chunk() {
    let chunks = Chunker::with_sizes(1000, 200).expect("defaults").split(&[doc("sky.txt", "The sky is blue.")]);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "The sky is blue.");
    assert_eq!(chunks[0].id, "sky.txt:0");
    assert_eq!(chunks[0].document_id, "sky.txt");
}

#[test]
fn empty_inputs_produce_no_chunks() {
    let chunker = Chunker::with_sizes(100, 10).expect("valid sizes");
    assert!(chunker.split(&[]).is_empty());
    assert!(chunker.split(&[doc("blank.txt", "  \n\n\t ")]).is_empty());
}

#[test]
fn invalid_sizes_are_rejected() {
    assert!(matches!(Chunker::with_sizes(100, 100), Err(Error::InvalidConfig(_))));
    assert!(matches!(Chunker::with_sizes(100, 250), Err(Error::InvalidConfig(_))));
    assert!(matches!(Chunker::with_sizes(0, 0), Err(Error::InvalidConfig(_))));
}

#[test]
fn chunk_ids_are_unique_across_documents() {
    let chunker = Chunker::with_sizes(60, 10).expect("valid sizes");
    let text = sample_text();
    let chunks = chunker.split(&[doc("a.txt", &text), doc("b/a.txt", &text)]);
    let ids: std::collections::HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids.len(), chunks.len());
}

#[test]
fn load_creates_missing_directory_idempotently() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("docs");

    let first = load_documents(&dir, &txt()).expect("first load");
    assert_eq!(first.status, CorpusStatus::Created);
    assert!(first.documents.is_empty());
    assert!(dir.is_dir());

    let second = load_documents(&dir, &txt()).expect("second load");
    assert_eq!(second.status, CorpusStatus::Empty);
    assert!(second.documents.is_empty());
}

#[test]
fn load_filters_extensions_and_recurses() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("a.txt"), "alpha bravo").unwrap();
    fs::write(dir.join("notes.md"), "# not loaded").unwrap();
    fs::create_dir_all(dir.join("sub")).unwrap();
    fs::write(dir.join("sub/b.TXT"), "charlie delta").unwrap();

    let load = load_documents(dir, &txt()).expect("load");
    assert_eq!(load.status, CorpusStatus::Loaded);
    let ids: Vec<&str> = load.documents.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["a.txt", "sub/b.TXT"]);
}

#[test]
fn load_skips_bad_files_and_keeps_going() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("good.txt"), "readable").unwrap();
    fs::write(dir.join("binary.txt"), [0u8, 159, 146, 150, 0]).unwrap();
    fs::write(dir.join("latin1.txt"), b"caf\xE9 au lait").unwrap();

    let load = load_documents(dir, &txt()).expect("load");
    let ids: Vec<&str> = load.documents.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["good.txt", "latin1.txt"]);
    assert_eq!(load.documents[1].encoding, Encoding::Utf8Lossy);
    assert_eq!(load.skipped.len(), 1);
    assert!(load.skipped[0].path.ends_with("binary.txt"));
}
