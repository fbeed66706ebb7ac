use thiserror::Error;

/// Failures that surface to callers of the ingestor and the retriever.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Index not ready: {0}")]
    RetrievalPrecondition(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Vector index failed: {0}")]
    Index(String),

    #[error("Corpus unreadable: {0}")]
    Corpus(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn embedding(err: impl std::fmt::Display) -> Self { Self::Embedding(err.to_string()) }

    pub fn index(err: impl std::fmt::Display) -> Self { Self::Index(err.to_string()) }
}

/// A corpus row that was skipped during loading.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("row {row}: {reason}")]
pub struct RowError {
    pub row: usize,
    pub reason: String,
}

/// Failure of the structured-generation capability.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("model refused: {0}")]
    Refusal(String),

    #[error("empty response")]
    Empty,

    #[error("missing credentials: {0}")]
    Credentials(String),
}

/// Why a query could not be expanded. Always recovered by the expander.
#[derive(Debug, Error)]
pub enum ExpansionError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("malformed structured output: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("structured output has the wrong shape: {0}")]
    Shape(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failure() {
        let err = Error::RetrievalPrecondition("table 'chunks' is missing".into());
        assert_eq!(err.to_string(), "Index not ready: table 'chunks' is missing");

        let row = RowError { row: 7, reason: "empty content".into() };
        assert_eq!(row.to_string(), "row 7: empty content");

        let exp = ExpansionError::from(GenerationError::Timeout);
        assert_eq!(exp.to_string(), "request timed out");
    }
}
