use std::env;
use std::time::Duration;

use groundctx_core::config::LlmConfig;
use groundctx_core::error::GenerationError;

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiConfig {
    /// Expander settings from configuration, with the key read from the env
    /// var named by `api_key_env` (a `.env` file is honored).
    pub fn from_llm_config(cfg: &LlmConfig) -> Result<Self, GenerationError> {
        dotenvy::dotenv().ok();

        let api_key = env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::Credentials(format!("{} environment variable not set", cfg.api_key_env)))?;

        Ok(Self::new(cfg, api_key))
    }

    /// Explicit key, other values from configuration.
    pub fn new(cfg: &LlmConfig, api_key: impl Into<String>) -> Self {
        Self {
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: cfg.expander_model.clone(),
            temperature: cfg.expander_temperature,
            max_tokens: cfg.max_tokens,
            timeout: Duration::from_secs(cfg.timeout_secs.max(1)),
        }
    }

    pub fn completions_url(&self) -> String { format!("{}/chat/completions", self.api_base) }
}
