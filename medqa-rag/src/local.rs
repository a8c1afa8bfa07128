//! Local sentence embeddings with a BERT-family model run through candle.
//!
//! This module is only available when the `local` feature is enabled. Model
//! files are fetched from the Hugging Face Hub on first use and cached under
//! `~/.cache/huggingface/hub/`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

pub use crate::backend::DEFAULT_LOCAL_MODEL;

const PROVIDER: &str = "local";
const MAX_SEQ_LENGTH: usize = 128;

fn model_error(message: impl std::fmt::Display) -> RagError {
    RagError::EmbeddingError { provider: PROVIDER.to_string(), message: message.to_string() }
}

/// Tokenizer plus model weights. All methods are synchronous and CPU bound.
struct SentenceEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimensions: usize,
}

impl SentenceEncoder {
    fn load(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;
        let api = hf_hub::api::sync::Api::new().map_err(model_error)?;
        let repo = api.model(model_id.to_string());

        let fetch = |file: &str| -> Result<PathBuf> {
            repo.get(file).map_err(|e| model_error(format!("failed to fetch {file} for {model_id}: {e}")))
        };

        let mut tokenizer = Tokenizer::from_file(fetch("tokenizer.json")?)
            .map_err(|e| model_error(format!("failed to load tokenizer: {e}")))?;

        let config_file = std::fs::File::open(fetch("config.json")?).map_err(model_error)?;
        let config: Config = serde_json::from_reader(config_file)
            .map_err(|e| model_error(format!("failed to parse config.json: {e}")))?;

        let vb = match fetch("model.safetensors") {
            // SAFETY: the weights file is owned by the hub cache and not mutated while mapped.
            Ok(weights) => unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)
                    .map_err(model_error)?
            },
            Err(_) => VarBuilder::from_pth(fetch("pytorch_model.bin")?, DType::F32, &device)
                .map_err(model_error)?,
        };
        let model = BertModel::load(vb, &config).map_err(model_error)?;

        // XLM-R tokenizers pad with `<pad>`, WordPiece ones with `[PAD]`.
        let (pad_token, pad_id) = ["<pad>", "[PAD]"]
            .into_iter()
            .find_map(|token| tokenizer.token_to_id(token).map(|id| (token.to_string(), id)))
            .unwrap_or_else(|| ("[PAD]".to_string(), 0));
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            pad_id,
            pad_token,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQ_LENGTH.min(config.max_position_embeddings),
                ..Default::default()
            }))
            .map_err(|e| model_error(format!("failed to configure truncation: {e}")))?;

        info!(model = model_id, dimensions = config.hidden_size, "loaded local embedding model");

        Ok(Self { model, tokenizer, device, dimensions: config.hidden_size })
    }

    /// Tokenize, run the encoder, mean-pool over real tokens, and L2-normalise.
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| model_error(format!("tokenization failed: {e}")))?;
        let batch = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

        let ids: Vec<u32> = encodings.iter().flat_map(|e| e.get_ids().to_vec()).collect();
        let mask: Vec<u32> =
            encodings.iter().flat_map(|e| e.get_attention_mask().to_vec()).collect();

        let input_ids = Tensor::from_vec(ids, (batch, seq_len), &self.device).map_err(model_error)?;
        let attention_mask =
            Tensor::from_vec(mask, (batch, seq_len), &self.device).map_err(model_error)?;
        let token_type_ids = input_ids.zeros_like().map_err(model_error)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(model_error)?;

        let mask = attention_mask.to_dtype(DType::F32).map_err(model_error)?;
        let pooled = mean_pool(&hidden, &mask).map_err(model_error)?;
        let normalized = normalize_l2(&pooled).map_err(model_error)?;
        normalized.to_vec2::<f32>().map_err(model_error)
    }
}

fn mean_pool(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = mask.unsqueeze(2)?.broadcast_as(hidden.shape())?;
    let summed = hidden.mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9f32, f32::MAX)?;
    summed.div(&counts)
}

fn normalize_l2(embeddings: &Tensor) -> candle_core::Result<Tensor> {
    let norms = embeddings.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12f32, f32::MAX)?;
    embeddings.broadcast_div(&norms)
}

/// An [`EmbeddingProvider`] that runs a sentence-transformers model in process.
///
/// Inference runs on the blocking thread pool so it never stalls the async
/// runtime. Vectors are unit length.
///
/// # Example
///
/// ```rust,ignore
/// use medqa_rag::local::{LocalEmbeddingProvider, DEFAULT_LOCAL_MODEL};
///
/// let provider = LocalEmbeddingProvider::load(DEFAULT_LOCAL_MODEL).await?;
/// let embedding = provider.embed("高血压").await?;
/// ```
#[derive(Clone)]
pub struct LocalEmbeddingProvider {
    encoder: Arc<SentenceEncoder>,
    model_id: String,
}

impl LocalEmbeddingProvider {
    /// Download (or reuse the cached copy of) `model_id` and load it.
    pub async fn load(model_id: impl Into<String>) -> Result<Self> {
        let model_id = model_id.into();
        let id = model_id.clone();
        let encoder = tokio::task::spawn_blocking(move || SentenceEncoder::load(&id))
            .await
            .map_err(|e| model_error(format!("model loading task failed: {e}")))??;
        Ok(Self { encoder: Arc::new(encoder), model_id })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors.pop().ok_or_else(|| model_error("encoder returned no vector"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");

        let encoder = Arc::clone(&self.encoder);
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = owned.iter().map(String::as_str).collect();
            encoder.encode(&refs)
        })
        .await
        .map_err(|e| model_error(format!("embedding task failed: {e}")))?
    }

    fn dimensions(&self) -> usize {
        self.encoder.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
