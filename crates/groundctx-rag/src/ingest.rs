use std::sync::Arc;
use tracing::{info, warn};

use groundctx_core::config::{AppConfig, CorpusConfig};
use groundctx_core::data_processor::{corpus_fingerprint, CorpusSource, DataProcessor};
use groundctx_core::error::{Error, Result};
use groundctx_core::traits::{l2_normalize, Embedder, VectorIndex};
use groundctx_core::types::{Chunk, IngestReport, IngestStats};

/// Builds the vector index from a corpus, once.
pub struct DocumentIngestor {
    processor: DataProcessor,
    corpus: CorpusConfig,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    rebuild_on_corpus_change: bool,
}

impl DocumentIngestor {
    pub fn new(cfg: &AppConfig, embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            processor: DataProcessor::new(&cfg.rag)?,
            corpus: cfg.corpus.clone(),
            embedder,
            index,
            batch_size: cfg.embedding.batch_size,
            rebuild_on_corpus_change: cfg.storage.rebuild_on_corpus_change,
        })
    }

    /// Make sure a built index exists.
    ///
    /// An existing index is reused without looking at `source` unless the
    /// corpus-change guard is on, in which case a differing fingerprint
    /// rebuilds it. Rows left by an unfinished build are replaced. The old
    /// rows are only cleared once every chunk has been embedded. With no
    /// index and no source this is a configuration error.
    pub async fn ingest(&self, source: Option<&CorpusSource>) -> Result<IngestReport> {
        let exists = self.index.exists().await.map_err(Error::index)?;
        if exists && !self.rebuild_on_corpus_change {
            info!("Loading existing vector index");
            return Ok(IngestReport::Reused);
        }
        let partial = !exists && self.index.is_partial().await.map_err(Error::index)?;
        if partial {
            warn!("Found an unfinished vector index, it will be rebuilt");
        }
        let Some(source) = source else {
            if exists {
                warn!("No corpus available to compare against, reusing existing index");
                return Ok(IngestReport::Reused);
            }
            return Err(Error::Configuration("no persisted index and no corpus available".into()));
        };

        let load = source.load(&self.corpus)?;
        let fingerprint = corpus_fingerprint(&load.documents);
        if exists {
            let stored = self.index.fingerprint().await.map_err(Error::index)?;
            if stored.as_deref() == Some(fingerprint.as_str()) {
                info!("Corpus unchanged, reusing existing vector index");
                return Ok(IngestReport::Reused);
            }
            warn!("Corpus changed since the index was built, rebuilding");
        }

        let skipped_rows = load.skipped.len();
        let processed = self.processor.process(load.documents);
        let mut stats = IngestStats {
            documents: processed.documents,
            skipped_rows,
            short_documents: processed.short_documents,
            chunks: 0,
            short_chunks: processed.short_chunks,
        };
        let embeddings = self.embed_chunks(&processed.chunks)?;

        if exists || partial {
            self.index.clear().await.map_err(Error::index)?;
        }
        if processed.chunks.is_empty() {
            warn!("No chunks survived filtering, nothing to index");
            return Ok(IngestReport::Built(stats));
        }
        stats.chunks = self.index.add(&processed.chunks, &embeddings).await.map_err(Error::index)?;
        // marks the build complete
        self.index.record_fingerprint(&fingerprint).await.map_err(Error::index)?;
        info!("Vector index built with {} chunks", stats.chunks);
        Ok(IngestReport::Built(stats))
    }

    fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let dim = self.embedder.dim();
        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).map_err(Error::embedding)?;
            if vectors.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            for mut v in vectors {
                if v.len() != dim {
                    return Err(Error::Embedding(format!("expected dimension {dim}, got {}", v.len())));
                }
                l2_normalize(&mut v);
                embeddings.push(v);
            }
        }
        Ok(embeddings)
    }
}
