//! pubagent-vector
//!
//! Persistent embedding index over document chunks, stored in LanceDB with a
//! JSON manifest describing how the vectors were produced. Vectors are L2
//! normalized before storage and before querying, and ranked by cosine
//! similarity.

pub mod index_build;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use lancedb::{Connection, Table};
use tracing::{debug, info, warn};

use pubagent_core::config::IndexSettings;
use pubagent_core::traits::Embedder;
use pubagent_core::types::{Chunk, RetrievedContext};
use pubagent_core::{Error, Result};

pub use table::IndexManifest;
pub use writer::IndexEntry;

pub(crate) trait PersistContext<T> {
    fn persist(self, what: &str) -> Result<T>;
}

impl<T, E: Display> PersistContext<T> for std::result::Result<T, E> {
    fn persist(self, what: &str) -> Result<T> {
        self.map_err(|e| Error::Persistence(format!("{what}: {e}")))
    }
}

/// Validate width and finiteness, then scale to unit length.
/// Applied identically to stored and query vectors.
pub fn prepare_vector(mut vector: Vec<f32>, dim: usize) -> Result<Vec<f32>> {
    if vector.len() != dim {
        return Err(Error::EmbeddingUnavailable(format!(
            "embedder produced a vector of width {} (expected {dim})",
            vector.len()
        )));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(Error::EmbeddingUnavailable("embedder produced a non-finite vector".to_string()));
    }
    pubagent_embed::l2_normalize(&mut vector);
    Ok(vector)
}

/// An opened, queryable index.
pub struct VectorIndex {
    table: Table,
    manifest: IndexManifest,
    _conn: Connection,
}

impl VectorIndex {
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Number of stored entries, as recorded at build time.
    pub fn len(&self) -> usize {
        self.manifest.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.entry_count == 0
    }

    pub async fn count_rows(&self) -> Result<usize> {
        self.table.count_rows(None).await.persist("counting rows")
    }
}

/// Builds, opens and queries the index at `settings.directory` with one embedder.
pub struct EmbeddingIndex {
    embedder: Arc<dyn Embedder>,
    settings: IndexSettings,
}

impl EmbeddingIndex {
    pub fn new(embedder: Arc<dyn Embedder>, settings: IndexSettings) -> Self {
        Self { embedder, settings }
    }

    pub fn location(&self) -> &Path {
        &self.settings.directory
    }

    /// Embed one text exactly as queries are embedded.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        prepare_vector(self.embedder.embed(text)?, self.embedder.dim())
    }

    pub async fn create(&self, chunks: &[Chunk]) -> Result<VectorIndex> {
        self.create_for_corpus(chunks, None).await
    }

    /// Embed and persist `chunks`, replacing any previous index only once the
    /// new one is complete. `fingerprint` identifies the corpus for staleness checks.
    pub async fn create_for_corpus(&self, chunks: &[Chunk], fingerprint: Option<String>) -> Result<VectorIndex> {
        let target = self.location();
        info!(chunks = chunks.len(), embedder = self.embedder.id(), dir = %target.display(), "building index");
        let entries = writer::embed_chunks(self.embedder.as_ref(), chunks, self.settings.batch_size)?;

        let staging = table::prepare_staging(target)?;
        if let Err(e) = self.populate(&staging, &entries, fingerprint).await {
            table::discard_staging(&staging);
            return Err(e);
        }
        if let Err(e) = table::swap_into_place(&staging, target) {
            table::discard_staging(&staging);
            return Err(e);
        }

        self.open().await?.ok_or_else(|| {
            Error::Persistence(format!("index at {} unreadable right after build", target.display()))
        })
    }

    async fn populate(&self, dir: &Path, entries: &[IndexEntry], fingerprint: Option<String>) -> Result<()> {
        let dim = self.embedder.dim();
        let conn = table::open_db(dir).await?;
        writer::write_table(&conn, &self.settings.table, entries, dim).await?;

        let mut manifest =
            IndexManifest::new(self.embedder.id(), dim, &self.settings.table, entries.len(), fingerprint);
        if let Some(min_rows) = self.settings.ann_min_rows {
            if entries.len() >= min_rows.max(index_build::MIN_TRAINING_ROWS) {
                let tbl = conn.open_table(&self.settings.table).execute().await.persist("opening chunk table")?;
                let params = index_build::compute_ivfpq_params(entries.len(), dim);
                match index_build::build_ivfpq_index(&tbl, params).await {
                    Ok(()) => manifest.ann_index = true,
                    Err(e) => warn!(error = %e, "IVF-PQ training failed; keeping flat search"),
                }
            } else {
                debug!(rows = entries.len(), min_rows, "too few rows for an IVF-PQ index");
            }
        }
        table::write_manifest(dir, &manifest)
    }

    /// Open the persisted index. `Ok(None)` when there is none, or when it was
    /// built by a different embedder or layout and must be rebuilt.
    pub async fn open(&self) -> Result<Option<VectorIndex>> {
        let dir = self.location();
        let Some(manifest) = table::read_manifest(dir)? else {
            return Ok(None);
        };
        if let Some(reason) = manifest.incompatibility(self.embedder.id(), self.embedder.dim()) {
            warn!(dir = %dir.display(), %reason, "existing index is incompatible; treating as absent");
            return Ok(None);
        }
        let conn = table::open_db(dir).await?;
        let table = conn.open_table(&manifest.table).execute().await.persist("opening chunk table")?;
        info!(dir = %dir.display(), entries = manifest.entry_count, "opened index");
        Ok(Some(VectorIndex { table, manifest, _conn: conn }))
    }

    /// The `k` entries most similar to `text`, best first.
    pub async fn query(&self, index: &VectorIndex, text: &str, k: usize) -> Result<RetrievedContext> {
        if k == 0 {
            return Err(Error::InvalidConfig("k must be at least 1".to_string()));
        }
        let rows = index.count_rows().await?;
        if rows == 0 {
            return Err(Error::EmptyIndex);
        }
        let vector = self.embed(text)?;
        let hits = search::nearest(&index.table, &vector, k.min(rows)).await?;
        Ok(RetrievedContext::from_unsorted(hits, k))
    }
}
