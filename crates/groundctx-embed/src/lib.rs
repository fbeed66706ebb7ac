//! Sentence embeddings for chunks and queries.
//!
//! [`EmbeddingModel`] runs an XLM-RoBERTa encoder (BGE-M3 by default) with
//! candle, mean-pools over the attention mask and L2-normalizes.
//! [`FakeEmbedder`] hashes tokens into a fixed-size vector and is used in
//! tests and when `embedding.use_fake` / `APP_USE_FAKE_EMBEDDINGS=1` is set.
use anyhow::{anyhow, ensure, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use groundctx_core::config::{expand_path, EmbeddingConfig};
use groundctx_core::traits::Embedder;

mod device;
mod pool;
mod tokenize;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch;

pub struct EmbeddingModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    query_prefix: String,
    passage_prefix: String,
}

impl EmbeddingModel {
    pub fn from_config(cfg: &EmbeddingConfig) -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir(cfg.model_dir.as_deref())?;
        info!(model = %cfg.model, dir = %model_dir.display(), "Loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        ensure!(
            config.hidden_size == cfg.dim,
            "model hidden size {} does not match embedding.dim {}",
            config.hidden_size,
            cfg.dim
        );

        let vb = load_weights(&model_dir, &device)?;
        let model = XLMRobertaModel::new(&config, vb)?;
        info!("Embedding model loaded");
        Ok(Self {
            model,
            tokenizer,
            device,
            dim: cfg.dim,
            max_len: cfg.max_len,
            query_prefix: cfg.query_prefix.clone(),
            passage_prefix: cfg.passage_prefix.clone(),
        })
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let out: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "Embedded batch");
        Ok(out)
    }
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.passage_prefix.is_empty() {
            return self.encode(texts);
        }
        let prefixed: Vec<String> = texts.iter().map(|t| format!("{}{}", self.passage_prefix, t)).collect();
        self.encode(&prefixed)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(&[format!("{}{}", self.query_prefix, text)])?
            .pop()
            .ok_or_else(|| anyhow!("embedder returned no vector for query"))
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // SAFETY: the weights file is not modified while the model is alive.
        return Ok(unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? });
    }
    let pickle = model_dir.join("pytorch_model.bin");
    ensure!(pickle.exists(), "no model.safetensors or pytorch_model.bin in {}", model_dir.display());
    let weights: HashMap<String, Tensor> = candle_core::pickle::read_all(&pickle)?.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights, DType::F32, device))
}

/// Deterministic token-hashing embedder. Same text, same unit vector.
#[derive(Debug, Clone)]
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim } }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        ensure!(self.dim > 0, "FakeEmbedder needs a non-zero dimension");
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// The embedder selected by configuration: fake when `use_fake` or
/// `APP_USE_FAKE_EMBEDDINGS` is set, otherwise the local model.
pub fn get_default_embedder(cfg: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    let env_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if cfg.use_fake || env_fake {
        info!(dim = cfg.dim, "Using FakeEmbedder");
        return Ok(Box::new(FakeEmbedder::new(cfg.dim)));
    }
    Ok(Box::new(EmbeddingModel::from_config(cfg)?))
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = expand_path(dir);
        if p.exists() { return Ok(p); }
        warn!(dir = %p.display(), "Configured model_dir does not exist, trying fallbacks");
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = expand_path(&dir);
            if p.exists() {
                debug!(var, dir = %p.display(), "Using model dir from env");
                return Ok(p);
            }
        }
    }
    for candidate in ["models/bge-m3", "../models/bge-m3"] {
        let p = Path::new(candidate);
        if p.exists() { return Ok(p.to_path_buf()); }
    }
    Err(anyhow!("Could not locate embedding model directory; set embedding.model_dir or APP_MODEL_DIR"))
}
