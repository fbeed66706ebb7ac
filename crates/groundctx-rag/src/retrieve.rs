use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use groundctx_core::error::{Error, Result};
use groundctx_core::traits::{l2_normalize, Embedder, VectorIndex};
use groundctx_core::types::{RetrievalOptions, RetrievalResult, ScoredChunk};

use crate::expand::QueryExpander;

/// Turns a query into grounding contexts and ranked source URLs.
pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    expander: Option<QueryExpander>,
}

impl ContextRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index, expander: None }
    }

    pub fn with_expander(mut self, expander: QueryExpander) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Top-`k` chunks for one query string, best first.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let mut query_vec = self.embedder.embed_query(query).map_err(Error::embedding)?;
        l2_normalize(&mut query_vec);
        self.index.search(&query_vec, k).await.map_err(Error::index)
    }

    pub async fn retrieve(&self, query: &str, options: RetrievalOptions) -> Result<RetrievalResult> {
        if !self.index.exists().await.map_err(Error::index)? {
            return Err(Error::RetrievalPrecondition("vector index has not been built; run ingestion first".into()));
        }

        let queries = self.active_queries(query, options.expansion_enabled).await;
        let mut pooled: Vec<ScoredChunk> = Vec::new();
        for q in &queries {
            let hits = self.similarity_search(q, options.num_chunks).await?;
            debug!(query = %q, hits = hits.len(), "Similarity search");
            pooled.extend(hits);
        }

        let contexts = dedup_contexts(&pooled, options.num_chunks);
        let source_urls = rank_source_urls(pooled.iter().map(|h| h.chunk.source_url.as_str()), options.max_links);
        info!(
            queries = queries.len(),
            pooled = pooled.len(),
            contexts = contexts.len(),
            urls = source_urls.len(),
            "Retrieved context"
        );
        Ok(RetrievalResult { contexts, source_urls })
    }

    async fn active_queries(&self, query: &str, expansion_enabled: bool) -> Vec<String> {
        if !expansion_enabled {
            return vec![query.to_string()];
        }
        match &self.expander {
            Some(expander) => expander.expand(query).await.queries,
            None => {
                warn!("Query expansion requested but no expander is configured");
                vec![query.to_string()]
            }
        }
    }
}

/// Distinct chunk texts in first-seen order, at most `limit` of them.
pub fn dedup_contexts(pooled: &[ScoredChunk], limit: usize) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    pooled
        .iter()
        .map(|h| h.chunk.text.as_str())
        .filter(|text| seen.insert(*text))
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// Absolute URLs by descending frequency, ties by first appearance, at most
/// `limit` of them. Relative or malformed URLs are not counted.
pub fn rank_source_urls<'a>(urls: impl IntoIterator<Item = &'a str>, limit: usize) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for raw in urls {
        if url::Url::parse(raw).is_err() {
            continue;
        }
        let count = counts.entry(raw).or_insert(0);
        if *count == 0 {
            order.push(raw);
        }
        *count += 1;
    }
    // stable sort keeps first-seen order among equal counts
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.into_iter().take(limit).map(str::to_string).collect()
}
