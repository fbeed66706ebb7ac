use std::sync::Arc;
use tracing::{debug, info, warn};

use groundctx_core::error::ExpansionError;
use groundctx_core::traits::{StructuredGenerator, StructuredRequest};
use groundctx_core::types::ExpandedQuerySet;

const EXPANSION_INSTRUCTION: &str = "\
You are a search specialist for a university document collection.
Rewrite the user's question into 2-3 short search queries that:
1. cover different aspects of the question,
2. use synonyms and related terms,
3. anticipate how the answer may be phrased in the documents.

Rules:
- If the question lists answer options, include their key terms.
- Write the queries in the language of the question; keep proper names as they are.
- Keep each query brief and precise.

Also return a one-line description of the search strategy.";

pub const SCHEMA_NAME: &str = "expanded_queries";

/// Rewrites a query into alternative search queries. Never fails: any
/// generation or decoding problem yields [`ExpandedQuerySet::fallback`].
pub struct QueryExpander {
    generator: Arc<dyn StructuredGenerator>,
}

impl QueryExpander {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self { Self { generator } }

    pub fn request(query: &str) -> StructuredRequest {
        StructuredRequest {
            system: EXPANSION_INSTRUCTION.to_string(),
            user: query.to_string(),
            schema_name: SCHEMA_NAME.to_string(),
            schema: ExpandedQuerySet::json_schema(),
        }
    }

    /// One generation attempt, decoded. Errors are returned, not recovered.
    pub async fn try_expand(&self, query: &str) -> Result<ExpandedQuerySet, ExpansionError> {
        let raw = self.generator.generate(&Self::request(query)).await?;
        ExpandedQuerySet::from_json(&raw)
    }

    pub async fn expand(&self, query: &str) -> ExpandedQuerySet {
        info!("Expanding query: {}", query);
        match self.try_expand(query).await {
            Ok(set) => {
                info!("Generated {} expanded queries", set.queries.len());
                debug!(queries = ?set.queries, strategy = %set.strategy_description, "Expanded queries");
                set
            }
            Err(e) => {
                warn!(error = %e, "Query expansion failed, using the original query");
                ExpandedQuerySet::fallback(query)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_query_and_schema() {
        let req = QueryExpander::request("how much is tuition?");
        assert_eq!(req.user, "how much is tuition?");
        assert_eq!(req.schema_name, SCHEMA_NAME);
        assert_eq!(req.schema["required"][0], "queries");
        assert!(req.system.contains("2-3"));
    }
}
