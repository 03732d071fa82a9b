use arrow_array::{Array, Float32Array, RecordBatch, StringArray, UInt32Array};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{DistanceType, Table};

use pubagent_core::types::RetrievedChunk;
use pubagent_core::{Error, Result};

use crate::schema::DISTANCE_COLUMN;
use crate::PersistContext;

/// Nearest `k` rows to `query` (already prepared) by cosine distance.
pub async fn nearest(table: &Table, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
    let batches: Vec<RecordBatch> = table
        .vector_search(query)
        .persist("building vector query")?
        .distance_type(DistanceType::Cosine)
        .select(Select::columns(&["id", "text", "source_path", "sequence_index"]))
        .limit(k)
        .execute()
        .await
        .persist("executing vector query")?
        .try_collect()
        .await
        .persist("reading vector query results")?;

    let mut hits = Vec::new();
    for batch in &batches {
        hits.extend(batch_to_hits(batch)?);
    }
    Ok(hits)
}

fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<RetrievedChunk>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let paths = string_column(batch, "source_path")?;
    let sequence = batch
        .column_by_name("sequence_index")
        .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
        .ok_or_else(|| missing("sequence_index"))?;
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| missing(DISTANCE_COLUMN))?;

    Ok((0..batch.num_rows())
        .map(|i| RetrievedChunk {
            chunk_id: ids.value(i).to_string(),
            text: texts.value(i).to_string(),
            score: distance_to_score(distances.value(i)),
            source_path: paths.value(i).to_string(),
            sequence_index: sequence.value(i) as usize,
        })
        .collect())
}

/// Cosine distance is `1 - cos`, so the similarity score is recovered as `1 - d`.
pub fn distance_to_score(distance: f32) -> f32 {
    1.0 - distance
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| missing(name))
}

fn missing(column: &str) -> Error {
    Error::Persistence(format!("search results lack column {column}"))
}
