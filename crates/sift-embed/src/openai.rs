use std::fmt;

use serde::{Deserialize, Serialize};

use crate::embedder::{Dimensions, Embedder, Embedding, l2_normalize};
use crate::error::{EmbedError, Result};

/// Client for any OpenAI-compatible `/embeddings` endpoint.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    name: String,
    model: String,
    dimensions: Dimensions,
}

impl fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("name", &self.name)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions.get())
            .finish()
    }
}

impl OpenAiEmbedder {
    #[must_use]
    pub fn new(api_key: Option<String>, mut base_url: String, model: String) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: crate::http::default_client(),
            api_key,
            base_url,
            name: "openai".into(),
            model,
            dimensions: Dimensions::default(),
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            input: text,
            model: &self.model,
        };

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!(embedder = %self.name, "embedding API error {status}: {text}");
            return Err(EmbedError::Status {
                provider: "openai",
                status: status.as_u16(),
            });
        }

        let resp: EmbeddingResponse = serde_json::from_str(&text)?;
        let mut vector = resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbedError::EmptyResponse { provider: "openai" })?;
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<usize> {
        if let Some(dims) = self.dimensions.get() {
            return Ok(dims);
        }
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

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn embedding_body(vector: &[f32]) -> serde_json::Value {
        serde_json::json!({ "data": [{ "embedding": vector, "index": 0 }] })
    }

    #[test]
    fn new_trims_trailing_slashes() {
        let e = OpenAiEmbedder::new(None, "http://localhost:8080/v1//".into(), "m".into());
        assert_eq!(e.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let e = OpenAiEmbedder::new(Some("sk-secret".into()), "http://x".into(), "m".into());
        let dbg = format!("{e:?}");
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("sk-secret"));
    }

    #[tokio::test]
    async fn embed_normalizes_and_fixes_dimensions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[3.0, 4.0])))
            .mount(&server)
            .await;

        let e = OpenAiEmbedder::new(Some("sk-test".into()), server.uri(), "text-embed".into());
        assert_eq!(e.init().await.unwrap(), 2);

        let emb = e.embed("hello").await.unwrap();
        assert_eq!(emb.dimensions, 2);
        assert!((emb.vector[0] - 0.6).abs() < 1e-6);
        assert!((emb.vector[1] - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let e = OpenAiEmbedder::new(None, server.uri(), "m".into());
        let err = e.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbedError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn empty_data_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })),
            )
            .mount(&server)
            .await;

        let e = OpenAiEmbedder::new(None, server.uri(), "m".into());
        assert!(matches!(
            e.embed("hello").await,
            Err(EmbedError::EmptyResponse { .. })
        ));
    }

    #[tokio::test]
    async fn dimension_change_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[1.0, 0.0])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(embedding_body(&[1.0, 0.0, 0.0])),
            )
            .mount(&server)
            .await;

        let e = OpenAiEmbedder::new(None, server.uri(), "m".into());
        e.init().await.unwrap();
        assert!(matches!(
            e.embed("hello").await,
            Err(EmbedError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }
}
