use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, UInt32Array, UInt64Array};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use std::sync::Arc;
use tracing::{debug, info};

use pubagent_core::traits::Embedder;
use pubagent_core::types::Chunk;
use pubagent_core::{Error, Result};

use crate::schema::{build_chunk_schema, list_width};
use crate::{prepare_vector, PersistContext};

/// One stored row: a chunk and its prepared embedding.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Embed `chunks` in batches of `batch_size`, preparing every vector for storage.
pub fn embed_chunks(embedder: &dyn Embedder, chunks: &[Chunk], batch_size: usize) -> Result<Vec<IndexEntry>> {
    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    let mut entries = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts)?;
        if vectors.len() != batch.len() {
            return Err(Error::EmbeddingUnavailable(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            )));
        }
        for (chunk, vector) in batch.iter().zip(vectors) {
            entries.push(IndexEntry { chunk: chunk.clone(), vector: prepare_vector(vector, embedder.dim())? });
        }
        pb.inc(batch.len() as u64);
        debug!(done = entries.len(), total = chunks.len(), "embedded batch");
    }
    pb.finish_and_clear();
    Ok(entries)
}

pub fn entries_to_record_batch(entries: &[IndexEntry], dim: usize) -> Result<RecordBatch> {
    let ids = StringArray::from_iter_values(entries.iter().map(|e| e.chunk.id.as_str()));
    let document_ids = StringArray::from_iter_values(entries.iter().map(|e| e.chunk.document_id.as_str()));
    let source_paths = StringArray::from_iter_values(entries.iter().map(|e| e.chunk.source_path.as_str()));
    let texts = StringArray::from_iter_values(entries.iter().map(|e| e.chunk.text.as_str()));
    let starts = UInt64Array::from_iter_values(entries.iter().map(|e| e.chunk.start_offset as u64));
    let ends = UInt64Array::from_iter_values(entries.iter().map(|e| e.chunk.end_offset as u64));
    let sequence = UInt32Array::from_iter_values(
        entries.iter().map(|e| u32::try_from(e.chunk.sequence_index).unwrap_or(u32::MAX)),
    );
    let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
        entries.iter().map(|e| Some(e.vector.iter().copied().map(Some).collect::<Vec<_>>())),
        list_width(dim),
    );
    RecordBatch::try_new(
        build_chunk_schema(dim),
        vec![
            Arc::new(ids),
            Arc::new(document_ids),
            Arc::new(source_paths),
            Arc::new(texts),
            Arc::new(starts),
            Arc::new(ends),
            Arc::new(sequence),
            Arc::new(vectors) as Arc<dyn Array>,
        ],
    )
    .persist("building record batch")
}

/// Create `table` holding `entries`. An empty slice creates an empty table.
pub async fn write_table(conn: &Connection, table: &str, entries: &[IndexEntry], dim: usize) -> Result<()> {
    let schema = build_chunk_schema(dim);
    let batch = if entries.is_empty() {
        RecordBatch::new_empty(schema.clone())
    } else {
        entries_to_record_batch(entries, dim)?
    };
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    conn.create_table(table, reader).execute().await.persist("creating chunk table")?;
    info!(table, rows = entries.len(), "wrote chunk table");
    Ok(())
}
