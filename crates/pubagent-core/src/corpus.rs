//! Corpus directory loading.
//!
//! A missing corpus directory is repaired by creating it; the repair is
//! reported through [`CorpusStatus::Created`] rather than happening silently.
//! Unreadable files are skipped and reported, never fatal for the whole load.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::{Document, Encoding};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusStatus {
    /// The directory did not exist and was created empty.
    Created,
    /// The directory exists but holds no recognized documents.
    Empty,
    Loaded,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct CorpusLoad {
    pub status: CorpusStatus,
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

impl CorpusLoad {
    /// Content hash over every document id and text, in load order.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.documents)
    }
}

pub fn fingerprint(documents: &[Document]) -> String {
    let mut hasher = blake3::Hasher::new();
    for doc in documents {
        hasher.update(doc.id.as_bytes());
        hasher.update(&[0]);
        hasher.update(doc.raw_text.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

pub fn load_documents(directory: &Path, extensions: &[String]) -> Result<CorpusLoad> {
    if !directory.exists() {
        fs::create_dir_all(directory).map_err(|e| {
            Error::Persistence(format!("cannot create corpus directory {}: {e}", directory.display()))
        })?;
        info!(directory = %directory.display(), "created documents directory");
        return Ok(CorpusLoad { status: CorpusStatus::Created, documents: vec![], skipped: vec![] });
    }

    let (files, mut skipped) = list_files(directory, extensions);
    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        match read_document(directory, &path) {
            Ok(doc) => documents.push(doc),
            Err(reason) => {
                warn!(path = %path.display(), %reason, "skipping unreadable document");
                skipped.push(SkippedFile { path, reason });
            }
        }
    }

    if documents.is_empty() {
        info!(directory = %directory.display(), extensions = ?extensions, "no documents found");
        return Ok(CorpusLoad { status: CorpusStatus::Empty, documents, skipped });
    }
    info!(count = documents.len(), skipped = skipped.len(), directory = %directory.display(), "loaded documents");
    Ok(CorpusLoad { status: CorpusStatus::Loaded, documents, skipped })
}

/// Recognized files under `root`, sorted, plus the entries the walk could not read.
fn list_files(root: &Path, extensions: &[String]) -> (Vec<PathBuf>, Vec<SkippedFile>) {
    let mut files = Vec::new();
    let mut skipped = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                warn!(path = %path.display(), error = %e, "skipping unreadable corpus entry");
                skipped.push(SkippedFile { path, reason: e.to_string() });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let recognized = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
        if recognized {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    (files, skipped)
}

fn read_document(root: &Path, path: &Path) -> std::result::Result<Document, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let (raw_text, encoding) = decode(&bytes).ok_or_else(|| "content is not text".to_string())?;
    let relative = path.strip_prefix(root).unwrap_or(path);
    let id = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Ok(Document { id, source_path: path.to_path_buf(), raw_text, encoding })
}

/// Best-effort decoding: BOM-marked UTF-16, then UTF-8, then lossy UTF-8.
/// Returns `None` for content that looks binary.
pub fn decode(bytes: &[u8]) -> Option<(String, Encoding)> {
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes).map(|s| (s, Encoding::Utf16Le));
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes).map(|s| (s, Encoding::Utf16Be));
    }
    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if body.contains(&0) {
        return None;
    }
    match std::str::from_utf8(body) {
        Ok(text) => Some((text.to_string(), Encoding::Utf8)),
        Err(_) => Some((String::from_utf8_lossy(body).into_owned(), Encoding::Utf8Lossy)),
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]])).collect();
    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_handles_boms_and_invalid_utf8() {
        assert_eq!(decode(b"plain"), Some(("plain".to_string(), Encoding::Utf8)));
        assert_eq!(decode(b"\xEF\xBB\xBFbom"), Some(("bom".to_string(), Encoding::Utf8)));
        assert_eq!(decode(&[0xFF, 0xFE, b'h', 0, b'i', 0]), Some(("hi".to_string(), Encoding::Utf16Le)));
        assert_eq!(decode(&[0xFE, 0xFF, 0, b'h', 0, b'i']), Some(("hi".to_string(), Encoding::Utf16Be)));
        let (text, enc) = decode(b"caf\xE9").expect("lossy");
        assert_eq!(enc, Encoding::Utf8Lossy);
        assert!(text.starts_with("caf"));
        assert_eq!(decode(b"\x00\x01binary"), None);
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let doc = |text: &str| Document {
            id: "a.txt".to_string(),
            source_path: PathBuf::from("a.txt"),
            raw_text: text.to_string(),
            encoding: Encoding::Utf8,
        };
        assert_eq!(fingerprint(&[doc("x")]), fingerprint(&[doc("x")]));
        assert_ne!(fingerprint(&[doc("x")]), fingerprint(&[doc("y")]));
    }

    #[cfg(unix)]
    #[test]
    fn walk_errors_are_reported_as_skipped() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("kept.txt"), "kept").unwrap();
        let dangling = tmp.path().join("dangling.txt");
        std::os::unix::fs::symlink(tmp.path().join("gone.txt"), &dangling).unwrap();

        let load = load_documents(tmp.path(), &["txt".to_string()]).unwrap();
        assert_eq!(load.status, CorpusStatus::Loaded);
        assert_eq!(load.documents.len(), 1);
        assert_eq!(load.documents[0].id, "kept.txt");
        assert_eq!(load.skipped.len(), 1);
        assert_eq!(load.skipped[0].path, dangling);
    }
}
