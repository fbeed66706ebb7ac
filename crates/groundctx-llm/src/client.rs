use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::timeout;
use tracing::debug;

use groundctx_core::config::LlmConfig;
use groundctx_core::error::GenerationError;
use groundctx_core::traits::{StructuredGenerator, StructuredRequest};

use crate::config::OpenAiConfig;

/// Chat-completions client with `json_schema` structured output.
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a Value,
    strict: bool,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat<'a>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Client for the expander model, key taken from the environment.
    pub fn from_llm_config(cfg: &LlmConfig) -> Result<Self, GenerationError> {
        Self::new(OpenAiConfig::from_llm_config(cfg)?)
    }

    pub fn config(&self) -> &OpenAiConfig { &self.config }

    fn request_body<'a>(&'a self, request: &'a StructuredRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.user },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat { name: &request.schema_name, schema: &request.schema, strict: true },
            },
        }
    }

    async fn perform(&self, request: &StructuredRequest) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(map_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Api { status, body });
        }

        let body = response.text().await.map_err(map_reqwest)?;
        parse_completion(&body)
    }
}

#[async_trait]
impl StructuredGenerator for OpenAiClient {
    async fn generate(&self, request: &StructuredRequest) -> Result<String, GenerationError> {
        debug!(model = %self.config.model, schema = %request.schema_name, "Structured generation request");
        match timeout(self.config.timeout, self.perform(request)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout),
        }
    }
}

fn map_reqwest(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() { GenerationError::Timeout } else { GenerationError::Transport(e.to_string()) }
}

/// Pull the message content out of a chat-completions response body.
fn parse_completion(body: &str) -> Result<String, GenerationError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::Transport(format!("unreadable completion body: {e}")))?;
    let message = parsed.choices.into_iter().next().map(|c| c.message).ok_or(GenerationError::Empty)?;
    if let Some(refusal) = message.refusal.filter(|r| !r.trim().is_empty()) {
        return Err(GenerationError::Refusal(refusal));
    }
    match message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(GenerationError::Empty),
    }
}
