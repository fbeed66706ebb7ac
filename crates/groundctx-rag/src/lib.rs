//! Retrieval pipeline: build the index once, then turn each query into
//! grounding context.
//!
//! [`DocumentIngestor`] fills a [`VectorIndex`](groundctx_core::VectorIndex)
//! from a corpus, [`QueryExpander`] optionally rewrites a query into several
//! search queries, and [`ContextRetriever`] pools, deduplicates and ranks the
//! search results.

pub mod expand;
pub mod ingest;
pub mod retrieve;

pub use expand::QueryExpander;
pub use ingest::DocumentIngestor;
pub use retrieve::{dedup_contexts, rank_source_urls, ContextRetriever};
