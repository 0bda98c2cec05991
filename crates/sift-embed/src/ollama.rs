use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};

use crate::embedder::{Dimensions, Embedder, Embedding, l2_normalize};
use crate::error::{EmbedError, Result};

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Ollama,
    name: String,
    model: String,
    dimensions: Dimensions,
}

impl OllamaEmbedder {
    #[must_use]
    pub fn new(base_url: &str, model: String) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            name: "ollama".into(),
            model,
            dimensions: Dimensions::default(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::from(text));

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| EmbedError::Other(format!("Ollama embedding request failed: {e}")))?;

        let mut vector = response
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbedError::EmptyResponse { provider: "ollama" })?;
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<usize> {
        if let Some(dims) = self.dimensions.get() {
            return Ok(dims);
        }
        self.client.list_local_models().await.map_err(|e| {
            EmbedError::Other(format!("failed to connect to Ollama, is it running? {e}"))
        })?;
        let probe = self.request("probe").await?;
        self.dimensions.fix(probe.len())
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let vector = self.request(text).await?;
        self.dimensions.fix(vector.len())?;
        Ok(Embedding::new(vector))
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions.get()
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':') {
        let port_str = &url[colon_pos + 1..];
        if let Ok(port) = port_str.parse::<u16>() {
            let host = url[..colon_pos].to_string();
            return (host, port);
        }
    }
    (url.to_string(), 11434)
}
