use anyhow::{anyhow, Result};
use arrow_array::{Array, Float32Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};

use groundctx_core::types::{Chunk, ScoredChunk};

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("search result is missing the '{}' column", name))
}

/// Turn one result batch into scored chunks. Score is `1 - cosine distance`.
pub fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<ScoredChunk>> {
    let contents = string_column(batch, "content")?;
    let urls = string_column(batch, "source_url")?;
    let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
    let mut hits = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let score = match distances {
            Some(d) if !d.is_null(i) => 1.0 - d.value(i),
            _ => 0.0,
        };
        hits.push(ScoredChunk { chunk: Chunk::new(contents.value(i), urls.value(i)), score });
    }
    Ok(hits)
}

pub async fn search_vec(db: &Connection, table_name: &str, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
    if k == 0 {
        return Ok(Vec::new());
    }
    let table = db.open_table(table_name).execute().await?;
    let mut stream = table
        .vector_search(query_vec.to_vec())?
        .distance_type(DistanceType::Cosine)
        .limit(k)
        .execute()
        .await?;
    let mut hits = Vec::new();
    while let Some(batch) = stream.try_next().await? {
        hits.extend(batch_to_hits(&batch)?);
    }
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(k);
    Ok(hits)
}
