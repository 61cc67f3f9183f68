use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use keyharvest_core::{EmbeddingConfig, EmbeddingError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

/// Turns a batch of texts into fixed-length vectors.
///
/// Implementations are used read-only from several tasks at once.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Sentence embedder backed by a BERT-family model in safetensors format,
/// mean-pooled over the attention mask and L2-normalized.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    hidden_size: usize,
}

impl BertEmbedder {
    pub fn load(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model_dir = &config.model_dir;
        if !model_dir.is_dir() {
            return Err(EmbeddingError::ModelNotFound {
                model_name: model_dir.display().to_string(),
            });
        }

        let raw_config = read_model_config(model_dir)?;
        let bert_config: BertConfig = parse_config(model_dir, &raw_config)?;
        let dims: ModelDims = parse_config(model_dir, &raw_config)?;
        info!(
            hidden_size = dims.hidden_size,
            num_layers = dims.num_hidden_layers,
            "Loaded embedding model configuration"
        );

        let tokenizer_path = model_dir.join("tokenizer.json");
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            EmbeddingError::TokenizationFailed {
                reason: format!("Failed to load {}: {}", tokenizer_path.display(), e),
            }
        })?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_sequence_length,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::TokenizationFailed {
                reason: e.to_string(),
            })?;

        let device = Device::Cpu;
        let weights = model_dir.join("model.safetensors");
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&weights], DTYPE, &device).map_err(|e| {
                EmbeddingError::ModelLoadingFailed {
                    model_path: format!("{}: {}", weights.display(), e),
                }
            })?
        };
        let model =
            BertModel::load(vb, &bert_config).map_err(|e| EmbeddingError::ModelLoadingFailed {
                model_path: format!("{}: {}", model_dir.display(), e),
            })?;

        info!("Embedding model loaded from {}", model_dir.display());
        Ok(Self {
            model,
            tokenizer,
            device,
            hidden_size: dims.hidden_size,
        })
    }

    fn forward(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::TokenizationFailed {
                reason: e.to_string(),
            })?;

        let ids = encodings
            .iter()
            .map(|encoding| Tensor::new(encoding.get_ids(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()
            .map_err(inference)?;
        let mask = encodings
            .iter()
            .map(|encoding| Tensor::new(encoding.get_attention_mask(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()
            .map_err(inference)?;

        self.pool(&ids, &mask).map_err(inference)
    }

    fn pool(&self, ids: &[Tensor], mask: &[Tensor]) -> candle_core::Result<Vec<Vec<f32>>> {
        let ids = Tensor::stack(ids, 0)?;
        let mask = Tensor::stack(mask, 0)?;
        let type_ids = ids.zeros_like()?;

        // (batch, seq, hidden)
        let hidden = self.model.forward(&ids, &type_ids, Some(&mask))?;

        let mask = mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?.maximum(1e-9f32)?;
        let pooled = summed.broadcast_div(&counts)?;

        let norms = pooled.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(1e-12f32)?;
        pooled.broadcast_div(&norms)?.to_vec2::<f32>()
    }
}

fn inference(e: candle_core::Error) -> EmbeddingError {
    EmbeddingError::InferenceFailed {
        reason: e.to_string(),
    }
}

impl Embedder for BertEmbedder {
    fn dimension(&self) -> usize {
        self.hidden_size
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        debug!("Embedding batch of {} texts", texts.len());
        self.forward(texts)
    }
}

/// The two fields we report on; the full config goes to candle.
#[derive(Debug, Deserialize)]
struct ModelDims {
    hidden_size: usize,
    num_hidden_layers: usize,
}

fn read_model_config(model_dir: &Path) -> Result<String, EmbeddingError> {
    let path = model_dir.join("config.json");
    std::fs::read_to_string(&path).map_err(|e| EmbeddingError::ModelLoadingFailed {
        model_path: format!("{}: {}", path.display(), e),
    })
}

fn parse_config<T: DeserializeOwned>(model_dir: &Path, raw: &str) -> Result<T, EmbeddingError> {
    serde_json::from_str(raw).map_err(|e| EmbeddingError::ModelLoadingFailed {
        model_path: format!("{}/config.json: {}", model_dir.display(), e),
    })
}
