//! On-disk layout of a persisted index.
//!
//! ```text
//! <index dir>/
//!   manifest.json   embedder identity, dimension, metric and corpus fingerprint
//!   lance/          LanceDB database holding the chunk table
//! ```
//!
//! A build writes into a sibling staging directory and is swapped into place
//! with renames, so an index directory is either the previous complete index,
//! absent, or the new complete index.

use chrono::Utc;
use lancedb::{connect, Connection};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use pubagent_core::{Error, Result};

use crate::PersistContext;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const LANCE_DIR: &str = "lance";
pub const FORMAT_VERSION: u32 = 1;
pub const METRIC_COSINE: &str = "cosine";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedder_id: String,
    pub dim: usize,
    pub metric: String,
    /// Stored vectors are unit length.
    pub normalized: bool,
    pub table: String,
    pub entry_count: usize,
    pub corpus_fingerprint: Option<String>,
    /// RFC 3339 timestamp of the build.
    pub created_at: String,
    pub ann_index: bool,
}

impl IndexManifest {
    pub fn new(
        embedder_id: &str,
        dim: usize,
        table: &str,
        entry_count: usize,
        corpus_fingerprint: Option<String>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            embedder_id: embedder_id.to_string(),
            dim,
            metric: METRIC_COSINE.to_string(),
            normalized: true,
            table: table.to_string(),
            entry_count,
            corpus_fingerprint,
            created_at: Utc::now().to_rfc3339(),
            ann_index: false,
        }
    }

    /// Why this manifest cannot serve queries for `embedder_id`/`dim`, if it cannot.
    pub fn incompatibility(&self, embedder_id: &str, dim: usize) -> Option<String> {
        if self.format_version != FORMAT_VERSION {
            return Some(format!("format version {} (expected {FORMAT_VERSION})", self.format_version));
        }
        if self.embedder_id != embedder_id {
            return Some(format!("built with embedder {} (current {embedder_id})", self.embedder_id));
        }
        if self.dim != dim {
            return Some(format!("dimension {} (current {dim})", self.dim));
        }
        if self.metric != METRIC_COSINE || !self.normalized {
            return Some(format!("metric {} normalized={}", self.metric, self.normalized));
        }
        None
    }
}

pub async fn open_db(dir: &Path) -> Result<Connection> {
    let uri = dir.join(LANCE_DIR);
    connect(uri.to_string_lossy().as_ref())
        .execute()
        .await
        .persist(&format!("opening database at {}", uri.display()))
}

/// Read the manifest in `dir`. `Ok(None)` when there is none or it does not parse.
pub fn read_manifest(dir: &Path) -> Result<Option<IndexManifest>> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).persist(&format!("reading {}", path.display()))?;
    match serde_json::from_str(&text) {
        Ok(manifest) => Ok(Some(manifest)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unparseable index manifest");
            Ok(None)
        }
    }
}

pub fn write_manifest(dir: &Path, manifest: &IndexManifest) -> Result<()> {
    let path = dir.join(MANIFEST_FILE);
    let text = serde_json::to_string_pretty(manifest).persist("serializing manifest")?;
    fs::write(&path, text).persist(&format!("writing {}", path.display()))
}

/// A fresh, empty staging directory next to `target`. Staging directories
/// left next to `target` by earlier builds are removed first.
pub fn prepare_staging(target: &Path) -> Result<PathBuf> {
    let staging = sibling(target, "staging")?;
    for leftover in leftovers(target, "staging")? {
        debug!(path = %leftover.display(), "removing leftover staging directory");
        fs::remove_dir_all(&leftover).persist(&format!("removing {}", leftover.display()))?;
    }
    fs::create_dir_all(&staging).persist(&format!("creating {}", staging.display()))?;
    Ok(staging)
}

/// Move `staging` into place at `target`, replacing any previous index.
/// If the new index cannot be installed the previous one is put back.
pub fn swap_into_place(staging: &Path, target: &Path) -> Result<()> {
    if !target.exists() {
        return fs::rename(staging, target).persist(&format!("installing {}", target.display()));
    }
    let retired = sibling(target, "old")?;
    if retired.exists() {
        fs::remove_dir_all(&retired).persist(&format!("removing {}", retired.display()))?;
    }
    fs::rename(target, &retired).persist(&format!("retiring {}", target.display()))?;
    if let Err(e) = fs::rename(staging, target) {
        if let Err(restore) = fs::rename(&retired, target) {
            warn!(path = %retired.display(), error = %restore, "could not restore previous index");
        }
        return Err(Error::Persistence(format!("installing {}: {e}", target.display())));
    }
    if let Err(e) = fs::remove_dir_all(&retired) {
        warn!(path = %retired.display(), error = %e, "could not remove retired index");
    }
    Ok(())
}

/// Remove a staging directory left behind by a failed build.
pub fn discard_staging(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        warn!(path = %staging.display(), error = %e, "could not remove staging directory");
    }
}

fn sibling(target: &Path, suffix: &str) -> Result<PathBuf> {
    let (parent, prefix) = sibling_prefix(target, suffix)?;
    fs::create_dir_all(&parent).persist(&format!("creating {}", parent.display()))?;
    Ok(parent.join(format!("{prefix}{}", std::process::id())))
}

/// Existing `.{name}.{suffix}-*` directories next to `target`, from any process.
fn leftovers(target: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let (parent, prefix) = sibling_prefix(target, suffix)?;
    let entries = fs::read_dir(&parent).persist(&format!("listing {}", parent.display()))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.persist(&format!("listing {}", parent.display()))?;
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            found.push(entry.path());
        }
    }
    Ok(found)
}

fn sibling_prefix(target: &Path, suffix: &str) -> Result<(PathBuf, String)> {
    let name = target
        .file_name()
        .ok_or_else(|| Error::Persistence(format!("index path {} has no directory name", target.display())))?;
    let parent = target.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    Ok((parent.to_path_buf(), format!(".{}.{suffix}-", name.to_string_lossy())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_compatibility_checks() {
        let m = IndexManifest::new("fake:xxhash64:d8", 8, "chunks", 3, None);
        assert_eq!(m.incompatibility("fake:xxhash64:d8", 8), None);
        assert!(m.incompatibility("bert:all-MiniLM-L6-v2:d384", 384).is_some());
        assert!(m.incompatibility("fake:xxhash64:d8", 16).is_some());
    }

    #[test]
    fn swap_replaces_previous_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = tmp.path().join("index");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("old.txt"), "old").unwrap();

        let staging = prepare_staging(&target).unwrap();
        fs::write(staging.join("new.txt"), "new").unwrap();
        swap_into_place(&staging, &target).unwrap();

        assert!(target.join("new.txt").exists());
        assert!(!target.join("old.txt").exists());
        assert!(!staging.exists());
    }

    #[test]
    fn failed_install_restores_previous_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = tmp.path().join("index");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("old.txt"), "old").unwrap();

        let missing = tmp.path().join("never-built");
        let err = swap_into_place(&missing, &target).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)), "{err:?}");
        assert_eq!(fs::read_to_string(target.join("old.txt")).unwrap(), "old");
        assert!(leftovers(&target, "old").unwrap().is_empty());
    }

    #[test]
    fn staging_from_other_builds_is_swept() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = tmp.path().join("index");
        let crashed = tmp.path().join(".index.staging-999999999");
        fs::create_dir_all(&crashed).unwrap();
        fs::write(crashed.join("data"), "partial").unwrap();
        let unrelated = tmp.path().join(".other.staging-1");
        fs::create_dir_all(&unrelated).unwrap();

        let staging = prepare_staging(&target).unwrap();
        assert!(staging.exists());
        assert!(!crashed.exists());
        assert!(unrelated.exists());
        assert_eq!(leftovers(&target, "staging").unwrap(), vec![staging]);
    }
}
