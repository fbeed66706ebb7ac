use async_trait::async_trait;

use crate::error::GenerationError;
use crate::types::{Chunk, ScoredChunk};

/// Embedding provider. Implementations should return L2-normalized vectors
/// of length `dim()`; callers normalize again before storing or searching.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    /// Embed passages for storage.
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
    /// Embed a search query. Models with asymmetric prefixes override this.
    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for query"))
    }
}

/// Persisted chunk store searched by cosine similarity.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// True once a non-empty index has been completely persisted.
    async fn exists(&self) -> anyhow::Result<bool>;
    /// Rows left behind by a build that never finished.
    async fn is_partial(&self) -> anyhow::Result<bool> { Ok(false) }
    /// Append chunks with their embeddings; returns rows written.
    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> anyhow::Result<usize>;
    /// Top-`k` chunks for a normalized query vector, best first.
    async fn search(&self, query_vec: &[f32], k: usize) -> anyhow::Result<Vec<ScoredChunk>>;

    /// Fingerprint of the corpus the index was built from, if recorded.
    async fn fingerprint(&self) -> anyhow::Result<Option<String>> { Ok(None) }
    async fn record_fingerprint(&self, _fingerprint: &str) -> anyhow::Result<()> { Ok(()) }
    /// Remove every indexed chunk.
    async fn clear(&self) -> anyhow::Result<()> {
        anyhow::bail!("this index cannot be cleared")
    }
}

/// A prompt for a schema-constrained generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRequest {
    pub system: String,
    pub user: String,
    pub schema_name: String,
    pub schema: serde_json::Value,
}

/// Generation capability constrained to a JSON schema. Returns the raw JSON
/// text; decoding into a typed value is the caller's job.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate(&self, request: &StructuredRequest) -> Result<String, GenerationError>;
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() { *x /= norm; }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_scales_to_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        l2_normalize(&mut zero);
        assert!(zero.iter().all(|x| *x == 0.0));
    }
}
