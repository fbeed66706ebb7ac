//! Domain types shared by the ingestor, the index and the retriever.

use serde::{Deserialize, Serialize};

use crate::error::ExpansionError;

/// One corpus row that survived loading.
///
/// - `content`: full document text
/// - `source_url`: where the text came from; may be empty or relative, in
///   which case it never shows up in ranked source URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub source_url: String,
}

impl Document {
    pub fn new(content: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self { content: content.into(), source_url: source_url.into() }
    }

    /// Length in characters, which is what the length thresholds compare against.
    pub fn len_chars(&self) -> usize { self.content.chars().count() }
}

/// A slice of a document, the unit that gets embedded and retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_url: String,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self { text: text.into(), source_url: source_url.into() }
    }

    pub fn len_chars(&self) -> usize { self.text.chars().count() }
}

/// A similarity-search hit. `score` is cosine similarity; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// The alternative search queries produced for one user query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedQuerySet {
    pub queries: Vec<String>,
    #[serde(rename = "search_strategy", alias = "strategy_description")]
    pub strategy_description: String,
}

impl ExpandedQuerySet {
    pub const MAX_QUERIES: usize = 3;
    pub const FALLBACK_STRATEGY: &'static str = "fallback";

    /// The set used whenever expansion is unavailable.
    pub fn fallback(query: &str) -> Self {
        Self { queries: vec![query.to_string()], strategy_description: Self::FALLBACK_STRATEGY.to_string() }
    }

    pub fn is_fallback(&self) -> bool { self.strategy_description == Self::FALLBACK_STRATEGY }

    /// Decode a structured-generation reply.
    ///
    /// Blank queries are dropped and at most [`Self::MAX_QUERIES`] are kept.
    /// A reply without a single usable query is a shape error.
    pub fn from_json(raw: &str) -> Result<Self, ExpansionError> {
        let parsed: ExpandedQuerySet = serde_json::from_str(raw)?;
        let queries: Vec<String> = parsed
            .queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(Self::MAX_QUERIES)
            .collect();
        if queries.is_empty() {
            return Err(ExpansionError::Shape("no non-blank queries".to_string()));
        }
        Ok(Self { queries, strategy_description: parsed.strategy_description.trim().to_string() })
    }

    /// JSON schema the generator is constrained to.
    pub fn json_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "search_strategy": { "type": "string" }
            },
            "required": ["queries", "search_strategy"],
            "additionalProperties": false
        })
    }
}

/// Per-request retrieval knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalOptions {
    pub num_chunks: usize,
    pub expansion_enabled: bool,
    pub max_links: usize,
}

impl From<&crate::config::RagConfig> for RetrievalOptions {
    fn from(rag: &crate::config::RagConfig) -> Self {
        Self { num_chunks: rag.num_chunks, expansion_enabled: rag.use_query_expansion, max_links: rag.max_links }
    }
}

/// Grounding context for one query.
///
/// `contexts` and `source_urls` are computed over different sets and are not
/// positionally aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub contexts: Vec<String>,
    pub source_urls: Vec<String>,
}

/// What an ingestion run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestReport {
    /// An index was already persisted; nothing was read or written.
    Reused,
    Built(IngestStats),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub documents: usize,
    pub skipped_rows: usize,
    pub short_documents: usize,
    pub chunks: usize,
    pub short_chunks: usize,
}
