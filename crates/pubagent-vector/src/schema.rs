use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const VECTOR_COLUMN: &str = "vector";
pub const DISTANCE_COLUMN: &str = "_distance";

/// Arrow schema of the chunk table for vectors of width `dim`.
pub fn build_chunk_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("document_id", DataType::Utf8, false),
        Field::new("source_path", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("start_offset", DataType::UInt64, false),
        Field::new("end_offset", DataType::UInt64, false),
        Field::new("sequence_index", DataType::UInt32, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), list_width(dim)),
            false,
        ),
    ]))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub(crate) fn list_width(dim: usize) -> i32 {
    dim.min(i32::MAX as usize) as i32
}
