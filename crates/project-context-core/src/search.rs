//! Project-scoped similarity search.
//!
//! Store backends only have to return candidate matches for a project. This
//! module owns the ordering guarantee: results are sorted by ascending
//! cosine distance (best match first) and truncated to `top_k`, whatever
//! order or count the backend produced.

use anyhow::Result;
use tracing::warn;
use uuid::Uuid;

use crate::models::EMBEDDING_DIMS;
use crate::store::{EmbeddingMatch, Store};

/// Nearest stored chunks of `project_id` to `query_vec`.
///
/// A query vector whose length is not [`EMBEDDING_DIMS`] is logged and
/// searched anyway; stored vectors of a different length score distance
/// `1.0`.
pub async fn search<S: Store + ?Sized>(
    store: &S,
    project_id: Uuid,
    query_vec: &[f32],
    top_k: usize,
) -> Result<Vec<EmbeddingMatch>> {
    if top_k == 0 {
        return Ok(Vec::new());
    }
    if query_vec.len() != EMBEDDING_DIMS {
        warn!(
            expected = EMBEDDING_DIMS,
            actual = query_vec.len(),
            "query embedding has unexpected dimensionality"
        );
    }

    let candidates = store
        .embedding_candidates(project_id, query_vec, top_k)
        .await?;
    Ok(rank_by_distance(candidates, top_k))
}

/// Sort ascending by distance (NaN last) and keep the first `top_k`.
pub fn rank_by_distance(mut matches: Vec<EmbeddingMatch>, top_k: usize) -> Vec<EmbeddingMatch> {
    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    matches.truncate(top_k);
    matches
}
