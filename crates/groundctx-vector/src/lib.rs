//! Persistent chunk index on LanceDB.
//!
//! [`LanceIndex`] stores one row per chunk (`id`, `content`, `source_url`,
//! `vector`) under a directory on disk and answers top-k cosine searches.
//! A `<table>_meta` side table records the fingerprint of the corpus the
//! index was built from. Ingestion writes it after the last chunk batch, so
//! rows without a fingerprint are an unfinished build.
use anyhow::Result;
use async_trait::async_trait;
use lancedb::Connection;
use std::path::Path;
use tracing::{debug, info};

use groundctx_core::traits::VectorIndex;
use groundctx_core::types::{Chunk, ScoredChunk};

pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

const FINGERPRINT_KEY: &str = "corpus_fingerprint";

pub struct LanceIndex {
    db: Connection,
    table_name: String,
    dim: usize,
}

impl LanceIndex {
    /// Connect to (or create) the database directory. Tables are created lazily.
    pub async fn open(db_path: &Path, table_name: &str, dim: usize) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = table::open_db(db_path.to_string_lossy().as_ref()).await?;
        debug!(path = %db_path.display(), table = table_name, "Opened LanceDB");
        Ok(Self { db, table_name: table_name.to_string(), dim })
    }

    /// Like [`LanceIndex::open`] but never touches the filesystem when the
    /// database directory is missing; returns `None` instead.
    pub async fn open_existing(db_path: &Path, table_name: &str, dim: usize) -> Result<Option<Self>> {
        if !db_path.is_dir() {
            return Ok(None);
        }
        let db = table::open_db(db_path.to_string_lossy().as_ref()).await?;
        Ok(Some(Self { db, table_name: table_name.to_string(), dim }))
    }

    pub fn table_name(&self) -> &str { &self.table_name }

    pub fn dim(&self) -> usize { self.dim }

    fn meta_table(&self) -> String { format!("{}_meta", self.table_name) }

    /// Rows in the chunk table, zero when it does not exist yet.
    pub async fn count_rows(&self) -> Result<usize> {
        if !table::table_exists(&self.db, &self.table_name).await? {
            return Ok(0);
        }
        let t = self.db.open_table(&self.table_name).execute().await?;
        Ok(t.count_rows(None).await?)
    }
}

#[async_trait]
impl VectorIndex for LanceIndex {
    /// Rows plus a recorded fingerprint; the fingerprint is written last.
    async fn exists(&self) -> Result<bool> {
        Ok(self.count_rows().await? > 0 && self.fingerprint().await?.is_some())
    }

    async fn is_partial(&self) -> Result<bool> {
        Ok(self.count_rows().await? > 0 && self.fingerprint().await?.is_none())
    }

    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<usize> {
        writer::write_chunks(&self.db, &self.table_name, chunks, embeddings, self.dim).await
    }

    async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        anyhow::ensure!(
            query_vec.len() == self.dim,
            "query vector has dimension {} but the index expects {}",
            query_vec.len(),
            self.dim
        );
        search::search_vec(&self.db, &self.table_name, query_vec, k).await
    }

    async fn fingerprint(&self) -> Result<Option<String>> {
        table::get_meta(&self.db, &self.meta_table(), FINGERPRINT_KEY).await
    }

    async fn record_fingerprint(&self, fingerprint: &str) -> Result<()> {
        table::set_meta(&self.db, &self.meta_table(), FINGERPRINT_KEY, fingerprint).await
    }

    async fn clear(&self) -> Result<()> {
        if table::table_exists(&self.db, &self.table_name).await? {
            let t = self.db.open_table(&self.table_name).execute().await?;
            t.delete("true").await?;
        }
        table::delete_meta(&self.db, &self.meta_table(), FINGERPRINT_KEY).await?;
        info!(table = %self.table_name, "Cleared index");
        Ok(())
    }
}
