//! OpenAI-compatible chat-completions client.
//!
//! This crate provides the [`StructuredGenerator`] implementation used by the
//! query expander: one request per call, output constrained to a JSON schema.

mod client;
mod config;

pub use client::OpenAiClient;
pub use config::OpenAiConfig;

pub use groundctx_core::traits::{StructuredGenerator, StructuredRequest};
