//! pubagent-embed
//!
//! Sentence embedders behind the [`Embedder`] trait: a candle BERT model
//! (`all-MiniLM-L6-v2` layout, masked mean pooling, L2 normalization) and a
//! deterministic hashing embedder for tests and offline development.
//! Set `APP_USE_FAKE_EMBEDDINGS=1` (or `embedding.use_fake`) to select the latter.

mod device;
mod pool;
mod tokenize;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use pubagent_core::config::EmbeddingSettings;
use pubagent_core::traits::Embedder;
use pubagent_core::{Error, Result};

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch;

pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
    dim: usize,
    max_len: usize,
}

impl BertEmbedder {
    pub fn load(settings: &EmbeddingSettings) -> Result<Self> {
        Self::load_inner(settings).map_err(unavailable)
    }

    fn load_inner(settings: &EmbeddingSettings) -> anyhow::Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir(settings)?;
        info!(model = %settings.model, dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_text = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: BertConfig = serde_json::from_str(&config_text)?;
        let dim = serde_json::from_str::<serde_json::Value>(&config_text)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))?;
        let dim = usize::try_from(dim)?;

        let vb = load_weights(&model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;
        let name = settings.model.rsplit('/').next().unwrap_or(&settings.model);
        let id = format!("bert:{name}:d{dim}");
        info!(id = %id, "embedding model loaded");
        Ok(Self { model, tokenizer, device, id, dim, max_len: settings.max_len })
    }

    fn embed_inner(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_dtype(DType::F32)?.to_device(&Device::Cpu)?.to_vec2()?;
        if vectors.iter().any(|v| v.len() != self.dim) {
            return Err(anyhow!("model produced vectors of unexpected width"));
        }
        Ok(vectors)
    }
}

impl Embedder for BertEmbedder {
    fn id(&self) -> &str {
        &self.id
    }
    fn dim(&self) -> usize {
        self.dim
    }
    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = std::time::Instant::now();
        let vectors = self.embed_inner(texts).map_err(unavailable)?;
        debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis(), "embedded batch");
        Ok(vectors)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> anyhow::Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // SAFETY: the weights file is memory-mapped read-only and not modified while loaded.
        return Ok(unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? });
    }
    let pth = model_dir.join("pytorch_model.bin");
    if pth.exists() {
        return Ok(VarBuilder::from_pth(&pth, DType::F32, device)?);
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

fn resolve_model_dir(settings: &EmbeddingSettings) -> anyhow::Result<PathBuf> {
    if let Some(dir) = &settings.model_dir {
        if dir.exists() {
            return Ok(dir.clone());
        }
        warn!(dir = %dir.display(), "configured model_dir does not exist");
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                debug!(var, dir = %p.display(), "using model dir from environment");
                return Ok(p);
            }
        }
    }
    let name = settings.model.rsplit('/').next().unwrap_or(&settings.model);
    let local = Path::new("models").join(name);
    if local.exists() {
        return Ok(local);
    }
    Err(anyhow!("Could not locate model directory for {}", settings.model))
}

fn unavailable(e: anyhow::Error) -> Error {
    Error::EmbeddingUnavailable(format!("{e:#}"))
}

/// Deterministic bag-of-words hashing embedder.
///
/// Each lowercase alphanumeric token is hashed into one of `dim` buckets, so
/// texts sharing words score higher. Not a semantic model.
pub struct FakeEmbedder {
    dim: usize,
    id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1), id: format!("fake:xxhash64:d{}", dim.max(1)) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            #[allow(clippy::cast_possible_truncation)]
            let idx = (h % self.dim as u64) as usize;
            #[allow(clippy::cast_precision_loss)]
            let val = 1.0 + ((h >> 32) as u32 as f32) / (u32::MAX as f32);
            v[idx] += val;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        l2_normalize(&mut v);
        v
    }
}

impl Embedder for FakeEmbedder {
    fn id(&self) -> &str {
        &self.id
    }
    fn dim(&self) -> usize {
        self.dim
    }
    fn max_len(&self) -> usize {
        256
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON { 0.0 } else { dot / (na * nb) }
}

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let use_fake = settings.use_fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if use_fake {
        info!(dim = settings.fake_dim, "using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(settings.fake_dim)));
    }
    Ok(Arc::new(BertEmbedder::load(settings)?))
}
