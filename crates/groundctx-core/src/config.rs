//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_RAG__NUM_CHUNKS=8`). The result is an explicit [`AppConfig`] value
//! handed to each component's constructor.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub rag: RagConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub corpus: CorpusConfig,
}

/// Chunking, filtering and retrieval knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub num_chunks: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_doc_length: usize,
    pub min_chunk_length: usize,
    pub max_links: usize,
    pub use_query_expansion: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            num_chunks: 5,
            chunk_size: 800,
            chunk_overlap: 100,
            min_doc_length: 400,
            min_chunk_length: 300,
            max_links: 3,
            use_query_expansion: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Directory holding `tokenizer.json`, `config.json` and the weights.
    pub model_dir: Option<String>,
    pub max_len: usize,
    pub dim: usize,
    pub batch_size: usize,
    /// Prepended to queries (e.g. `"query: "` for E5-style models).
    pub query_prefix: String,
    /// Prepended to passages (e.g. `"passage: "`).
    pub passage_prefix: String,
    pub use_fake: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "BAAI/bge-m3".to_string(),
            model_dir: None,
            max_len: 256,
            dim: 1024,
            batch_size: 64,
            query_prefix: String::new(),
            passage_prefix: String::new(),
            use_fake: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    /// Name of the env var holding the API key.
    pub api_key_env: String,
    pub expander_model: String,
    pub expander_temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            expander_model: "gpt-4o-2024-08-06".to_string(),
            expander_temperature: 0.3,
            max_tokens: 500,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub index_dir: String,
    pub table: String,
    /// Rebuild when the corpus fingerprint differs from the indexed one.
    pub rebuild_on_corpus_change: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { index_dir: "data/lancedb".to_string(), table: "chunks".to_string(), rebuild_on_corpus_change: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// CSV or JSON Lines file with `content` and `url` columns.
    pub path: String,
    /// Fallback directory of `*.txt` files used when `path` is absent.
    pub raw_texts_dir: String,
    pub default_url: String,
    /// File name -> source URL for raw text files.
    pub url_map: BTreeMap<String, String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: "data/processed/texts.csv".to_string(),
            raw_texts_dir: "data/raw_texts".to_string(),
            default_url: "https://itmo.ru".to_string(),
            url_map: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        let rag = &self.rag;
        if rag.chunk_size == 0 {
            return Err(Error::Configuration("rag.chunk_size must be positive".into()));
        }
        if rag.chunk_overlap > rag.chunk_size {
            return Err(Error::Configuration(format!(
                "rag.chunk_overlap ({}) is larger than rag.chunk_size ({})",
                rag.chunk_overlap, rag.chunk_size
            )));
        }
        if self.embedding.dim == 0 {
            return Err(Error::Configuration("embedding.dim must be positive".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::Configuration("embedding.batch_size must be positive".into()));
        }
        if self.storage.table.trim().is_empty() {
            return Err(Error::Configuration("storage.table must not be empty".into()));
        }
        Ok(())
    }
}

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    /// Load from the current directory, picking the env from `RUST_ENV`.
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let base_dir = env::current_dir().map_err(|e| Error::Configuration(format!("no working directory: {e}")))?;
        Self::load_from(&base_dir, &env_name)
    }

    /// Load `config.toml` and `config.<env>.toml` found under `base_dir`.
    pub fn load_from(base_dir: &Path, env_name: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(base_dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(base_dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base_dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base_dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, base_dir: base_dir.to_path_buf() };
        config.settings()?.validate()?;
        Ok(config)
    }

    /// The fully merged, typed settings.
    pub fn settings(&self) -> Result<AppConfig> {
        self.figment
            .extract()
            .map_err(|e| Error::Configuration(e.to_string()))
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Configuration(format!("Failed to get '{}': {}", key, e)))
    }

    /// Resolve a configured path against the directory the config was loaded from.
    pub fn resolve_path<S: AsRef<str>>(&self, p: S) -> PathBuf { resolve_with_base(&self.base_dir, p) }

    pub fn base_dir(&self) -> &Path { &self.base_dir }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
