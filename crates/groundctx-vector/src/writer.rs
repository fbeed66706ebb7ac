use anyhow::{ensure, Result};
use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use std::sync::Arc;
use tracing::info;

use groundctx_core::types::Chunk;

use crate::schema::build_chunk_schema;
use crate::table::table_exists;

const WRITE_BATCH: usize = 1000;

/// Stable row id for a chunk.
pub fn chunk_id(chunk: &Chunk) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(chunk.source_url.as_bytes());
    hasher.update(&[0]);
    hasher.update(chunk.text.as_bytes());
    hasher.finalize().to_hex().as_str()[..16].to_string()
}

pub fn chunks_to_record_batch(chunks: &[Chunk], embeddings: &[Vec<f32>], dim: usize) -> Result<RecordBatch> {
    ensure!(chunks.len() == embeddings.len(), "{} chunks but {} embeddings", chunks.len(), embeddings.len());
    if let Some(bad) = embeddings.iter().find(|v| v.len() != dim) {
        anyhow::bail!("embedding has dimension {} but the index expects {}", bad.len(), dim);
    }
    let ids: Vec<String> = chunks.iter().map(chunk_id).collect();
    let contents: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let urls: Vec<&str> = chunks.iter().map(|c| c.source_url.as_str()).collect();
    let vectors = embeddings.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    let record_batch = RecordBatch::try_new(
        build_chunk_schema(dim),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(urls)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim as i32)),
        ],
    )?;
    Ok(record_batch)
}

/// Append rows in batches, creating the table on first write.
pub async fn write_chunks(db: &Connection, table_name: &str, chunks: &[Chunk], embeddings: &[Vec<f32>], dim: usize) -> Result<usize> {
    ensure!(chunks.len() == embeddings.len(), "{} chunks but {} embeddings", chunks.len(), embeddings.len());
    if chunks.is_empty() {
        return Ok(0);
    }
    info!("Indexing {} chunks into LanceDB table: {}", chunks.len(), table_name);
    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    let mut written = 0usize;
    for (chunk_batch, emb_batch) in chunks.chunks(WRITE_BATCH).zip(embeddings.chunks(WRITE_BATCH)) {
        let record_batch = chunks_to_record_batch(chunk_batch, emb_batch, dim)?;
        let schema = record_batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
        if table_exists(db, table_name).await? {
            db.open_table(table_name).execute().await?.add(reader).execute().await?;
        } else {
            db.create_table(table_name, reader).execute().await?;
        }
        written += chunk_batch.len();
        pb.set_position(written as u64);
    }
    pb.finish_with_message("done");
    info!("Indexed {} chunks into LanceDB", written);
    Ok(written)
}
