//! Local BERT-style sentence embeddings via candle.

use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;

use crate::embedder::{Dimensions, Embedder, Embedding};
use crate::error::{EmbedError, Result};

pub use candle_core::Device as CandleDevice;

/// Pick the best available device: metal, then cuda, then CPU.
#[must_use]
pub fn auto_device() -> Device {
    #[cfg(feature = "metal")]
    if let Ok(device) = Device::new_metal(0) {
        return device;
    }
    #[cfg(feature = "cuda")]
    if let Ok(device) = Device::new_cuda(0) {
        return device;
    }
    Device::Cpu
}

struct EmbedModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl EmbedModel {
    fn load(repo_id: &str, device: &Device) -> Result<Self> {
        let api = hf_hub::api::sync::Api::new().map_err(|e| {
            EmbedError::ModelLoad(format!("failed to create HuggingFace API client: {e}"))
        })?;
        let repo = api.model(repo_id.to_owned());
        let fetch = |file: &str| {
            repo.get(file).map_err(|e| {
                EmbedError::ModelLoad(format!("failed to download {file} from {repo_id}: {e}"))
            })
        };

        let config_path = fetch("config.json")?;
        let tokenizer_path = fetch("tokenizer.json")?;
        let weights_path = fetch("model.safetensors")?;

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| EmbedError::ModelLoad(format!("failed to read BERT config: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config_str)?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedError::ModelLoad(format!("failed to load tokenizer: {e}")))?;

        // SAFETY: the safetensors file comes from the hf-hub cache and is not modified while mapped
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)? };
        let model = BertModel::load(vb, &config)?;

        Ok(Self {
            model,
            tokenizer,
            device: device.clone(),
        })
    }

    fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedError::Inference(format!("tokenizer encode failed: {e}")))?;

        let token_ids = encoding.get_ids();
        let token_type_ids: Vec<u32> = vec![0; token_ids.len()];

        let input_ids = Tensor::new(token_ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(token_type_ids.as_slice(), &self.device)?.unsqueeze(0)?;

        let embeddings = self.model.forward(&input_ids, &token_type_ids, None)?;

        // mean pooling over the sequence
        let seq_len = embeddings.dim(1)?;
        let sum = embeddings.sum(1)?;
        let mean_pooled = (sum
            / f64::from(
                u32::try_from(seq_len)
                    .map_err(|e| EmbedError::Inference(format!("sequence length overflow: {e}")))?,
            ))?;

        let norm = mean_pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        let normalized = mean_pooled.broadcast_div(&norm)?.squeeze(0)?;

        normalized.to_vec1::<f32>().map_err(EmbedError::Candle)
    }
}

/// In-process embedder. The model is downloaded and loaded on first `init`.
#[derive(Clone)]
pub struct CandleEmbedder {
    name: String,
    repo_id: String,
    device: Device,
    model: Arc<OnceCell<Arc<EmbedModel>>>,
    dimensions: Dimensions,
}

impl std::fmt::Debug for CandleEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleEmbedder")
            .field("name", &self.name)
            .field("repo_id", &self.repo_id)
            .field("device", &format!("{:?}", self.device))
            .field("loaded", &self.model.initialized())
            .finish_non_exhaustive()
    }
}

impl CandleEmbedder {
    #[must_use]
    pub fn new(repo_id: impl Into<String>, device: Device) -> Self {
        Self {
            name: "candle".into(),
            repo_id: repo_id.into(),
            device,
            model: Arc::new(OnceCell::new()),
            dimensions: Dimensions::default(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    async fn loaded(&self) -> Result<Arc<EmbedModel>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let repo_id = self.repo_id.clone();
                let device = self.device.clone();
                tracing::info!(embedder = %self.name, repo = %repo_id, "loading embedding model");
                tokio::task::spawn_blocking(move || EmbedModel::load(&repo_id, &device))
                    .await
                    .map_err(|e| EmbedError::ModelLoad(format!("model load task failed: {e}")))?
                    .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(model))
    }

    async fn run(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.loaded().await?;
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || model.embed_sync(&text))
            .await
            .map_err(|e| EmbedError::Inference(format!("candle embedding task failed: {e}")))?
    }
}

impl Embedder for CandleEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<usize> {
        if let Some(dims) = self.dimensions.get() {
            return Ok(dims);
        }
        let probe = self.run("probe").await?;
        self.dimensions.fix(probe.len())
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        if !self.model.initialized() {
            return Err(EmbedError::NotInitialized(self.name.clone()));
        }
        let vector = self.run(text).await?;
        self.dimensions.fix(vector.len())?;
        Ok(Embedding::new(vector))
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions.get()
    }
}
