#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use groundctx_core::config::AppConfig;
use groundctx_core::error::GenerationError;
use groundctx_core::traits::{Embedder, StructuredGenerator, StructuredRequest, VectorIndex};
use groundctx_core::types::{Chunk, ScoredChunk};

/// Brute-force cosine index held in memory; counts writes. With
/// `fail_add` set, `add` stores the first chunk and then errors, like a
/// batched writer dying part way.
#[derive(Default)]
pub struct InMemoryIndex {
    rows: Mutex<Vec<(Chunk, Vec<f32>)>>,
    fingerprint: Mutex<Option<String>>,
    pub add_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,
    pub fail_add: AtomicBool,
}

impl InMemoryIndex {
    pub fn chunks(&self) -> Vec<Chunk> {
        self.rows.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn vectors(&self) -> Vec<Vec<f32>> {
        self.rows.lock().unwrap().iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn writes(&self) -> usize { self.add_calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn exists(&self) -> anyhow::Result<bool> {
        Ok(!self.rows.lock().unwrap().is_empty() && self.fingerprint.lock().unwrap().is_some())
    }

    async fn is_partial(&self) -> anyhow::Result<bool> {
        Ok(!self.rows.lock().unwrap().is_empty() && self.fingerprint.lock().unwrap().is_none())
    }

    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> anyhow::Result<usize> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        if self.fail_add.load(Ordering::SeqCst) {
            rows.extend(chunks.iter().cloned().zip(embeddings.iter().cloned()).take(1));
            anyhow::bail!("disk full");
        }
        rows.extend(chunks.iter().cloned().zip(embeddings.iter().cloned()));
        Ok(chunks.len())
    }

    async fn search(&self, query_vec: &[f32], k: usize) -> anyhow::Result<Vec<ScoredChunk>> {
        let rows = self.rows.lock().unwrap();
        let mut hits: Vec<ScoredChunk> = rows
            .iter()
            .map(|(c, v)| ScoredChunk { chunk: c.clone(), score: v.iter().zip(query_vec).map(|(a, b)| a * b).sum() })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn fingerprint(&self) -> anyhow::Result<Option<String>> { Ok(self.fingerprint.lock().unwrap().clone()) }

    async fn record_fingerprint(&self, fingerprint: &str) -> anyhow::Result<()> {
        *self.fingerprint.lock().unwrap() = Some(fingerprint.to_string());
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap().clear();
        *self.fingerprint.lock().unwrap() = None;
        Ok(())
    }
}

/// Index whose searches return a fixed list per call, in order.
pub struct ScriptedIndex {
    pub responses: Mutex<Vec<Vec<ScoredChunk>>>,
}

impl ScriptedIndex {
    pub fn new(responses: Vec<Vec<ScoredChunk>>) -> Self { Self { responses: Mutex::new(responses) } }
}

#[async_trait]
impl VectorIndex for ScriptedIndex {
    async fn exists(&self) -> anyhow::Result<bool> { Ok(true) }

    async fn add(&self, _chunks: &[Chunk], _embeddings: &[Vec<f32>]) -> anyhow::Result<usize> {
        anyhow::bail!("read-only")
    }

    async fn search(&self, _query_vec: &[f32], k: usize) -> anyhow::Result<Vec<ScoredChunk>> {
        let mut responses = self.responses.lock().unwrap();
        let mut next = if responses.is_empty() { Vec::new() } else { responses.remove(0) };
        next.truncate(k);
        Ok(next)
    }
}

/// Generator that always returns the same raw reply and records prompts.
pub struct FixedGenerator {
    pub reply: String,
    pub calls: AtomicUsize,
}

impl FixedGenerator {
    pub fn new(reply: &str) -> Arc<Self> { Arc::new(Self { reply: reply.to_string(), calls: AtomicUsize::new(0) }) }
}

#[async_trait]
impl StructuredGenerator for FixedGenerator {
    async fn generate(&self, _request: &StructuredRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Generator that fails every call with a fresh copy of one error kind.
pub struct FailingGenerator {
    pub make: fn() -> GenerationError,
    pub calls: AtomicUsize,
}

impl FailingGenerator {
    pub fn new(make: fn() -> GenerationError) -> Arc<Self> { Arc::new(Self { make, calls: AtomicUsize::new(0) }) }
}

#[async_trait]
impl StructuredGenerator for FailingGenerator {
    async fn generate(&self, _request: &StructuredRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.make)())
    }
}

pub fn hit(text: &str, url: &str) -> ScoredChunk { ScoredChunk { chunk: Chunk::new(text, url), score: 0.9 } }

/// Small thresholds so tests can use short documents.
pub fn test_config(dim: usize) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.rag.chunk_size = 200;
    cfg.rag.chunk_overlap = 20;
    cfg.rag.min_doc_length = 400;
    cfg.rag.min_chunk_length = 40;
    cfg.embedding.dim = dim;
    cfg.embedding.batch_size = 4;
    cfg.embedding.use_fake = true;
    cfg
}

pub fn text_of_len(seed: &str, len: usize) -> String {
    let mut s = String::new();
    let mut i = 0;
    while s.chars().count() < len {
        if !s.is_empty() { s.push(' '); }
        s.push_str(&format!("{seed}{i}"));
        i += 1;
    }
    s.chars().take(len).collect::<String>().trim_end().to_string()
}

/// Embedder that returns unnormalized vectors, or fails when `fail` is set.
pub struct RawEmbedder {
    pub dim: usize,
    pub fail: bool,
}

impl Embedder for RawEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { 512 }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.fail {
            anyhow::bail!("model not loaded");
        }
        Ok(texts.iter().map(|t| vec![t.len() as f32 + 1.0; self.dim]).collect())
    }
}
