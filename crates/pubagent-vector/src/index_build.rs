use lancedb::index::{vector::IvfPqIndexBuilder, Index};
use lancedb::{DistanceType, Table};
use tracing::info;

use pubagent_core::Result;

use crate::schema::VECTOR_COLUMN;
use crate::PersistContext;

/// PQ codebooks hold 256 centroids per sub-vector, so training needs at least
/// that many rows.
pub const MIN_TRAINING_ROWS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfPqParams {
    pub nlist: usize,
    pub m: usize,
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn compute_ivfpq_params(rows: usize, dim: usize) -> IvfPqParams {
    let sqrt_n = (rows as f64).sqrt() as usize;
    let mut nlist = sqrt_n.clamp(1, 65536);
    // Clamp nlist to be less than rows for tiny datasets
    if rows > 1 {
        nlist = nlist.min(rows - 1);
    } else {
        nlist = 1;
    }
    let preferred = if dim >= 1024 { 32 } else { 16 };
    let m = (1..=preferred).rev().find(|m| dim % m == 0).unwrap_or(1);
    IvfPqParams { nlist, m }
}

pub async fn build_ivfpq_index(table: &Table, params: IvfPqParams) -> Result<()> {
    info!(nlist = params.nlist, m = params.m, "training IVF-PQ index");
    table
        .create_index(
            &[VECTOR_COLUMN],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::Cosine)
                    .num_partitions(u32::try_from(params.nlist).unwrap_or(u32::MAX))
                    .num_sub_vectors(u32::try_from(params.m).unwrap_or(u32::MAX)),
            ),
        )
        .execute()
        .await
        .persist("training IVF-PQ index")
}
