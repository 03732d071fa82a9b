use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use pubagent_core::chunker::Chunker;
use pubagent_core::config::{CorpusSettings, Settings};
use pubagent_core::corpus::{load_documents, CorpusLoad};
use pubagent_core::Result;
use pubagent_vector::{EmbeddingIndex, VectorIndex};

/// Outcome of [`CorpusManager::ensure_index`].
pub enum IndexState {
    Ready(VectorIndex),
    /// The corpus holds nothing to index; answering is not possible.
    NoDocuments,
}

impl IndexState {
    pub fn index(&self) -> Option<&VectorIndex> {
        match self {
            IndexState::Ready(index) => Some(index),
            IndexState::NoDocuments => None,
        }
    }
}

pub struct CorpusManager {
    index: Arc<EmbeddingIndex>,
    chunker: Chunker,
    corpus: CorpusSettings,
    rebuild_on_change: bool,
}

impl CorpusManager {
    pub fn new(index: Arc<EmbeddingIndex>, settings: &Settings) -> Result<Self> {
        Ok(Self {
            index,
            chunker: Chunker::new(settings.chunking)?,
            corpus: settings.corpus.clone(),
            rebuild_on_change: settings.index.rebuild_on_change,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.corpus.directory
    }

    /// Load the corpus directory, creating it when missing.
    pub fn load(&self) -> Result<CorpusLoad> {
        load_documents(&self.corpus.directory, &self.corpus.extensions)
    }

    /// Open the persisted index, building it from the corpus when there is none.
    pub async fn ensure_index(&self) -> Result<IndexState> {
        let Some(index) = self.index.open().await? else {
            info!("no usable index; building from corpus");
            return self.build(self.load()?).await;
        };
        if !self.rebuild_on_change {
            return Ok(IndexState::Ready(index));
        }

        let load = self.load()?;
        let fingerprint = load.fingerprint();
        if index.manifest().corpus_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            return Ok(IndexState::Ready(index));
        }
        warn!(directory = %self.corpus.directory.display(), "corpus changed since the index was built; rebuilding");
        drop(index);
        self.build(load).await
    }

    /// Rebuild from the corpus regardless of any persisted index.
    pub async fn rebuild(&self) -> Result<IndexState> {
        self.build(self.load()?).await
    }

    async fn build(&self, load: CorpusLoad) -> Result<IndexState> {
        if load.documents.is_empty() {
            info!(directory = %self.corpus.directory.display(), "no documents to index");
            return Ok(IndexState::NoDocuments);
        }
        let chunks = self.chunker.split(&load.documents);
        if chunks.is_empty() {
            info!(documents = load.documents.len(), "documents contain no text to index");
            return Ok(IndexState::NoDocuments);
        }
        info!(documents = load.documents.len(), chunks = chunks.len(), "documents split into chunks");
        let index = self.index.create_for_corpus(&chunks, Some(load.fingerprint())).await?;
        Ok(IndexState::Ready(index))
    }
}
