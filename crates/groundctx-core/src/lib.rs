pub mod config;
pub mod data_processor;
pub mod error;
pub mod splitter;
pub mod traits;
pub mod types;

pub use config::{AppConfig, Config};
pub use error::{Error, Result};
pub use traits::{Embedder, StructuredGenerator, StructuredRequest, VectorIndex};
pub use types::{Chunk, Document, ExpandedQuerySet, RetrievalOptions, RetrievalResult, ScoredChunk};
