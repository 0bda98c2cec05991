#[cfg(feature = "candle")]
use crate::candle::CandleEmbedder;
use crate::embedder::{Embedder, Embedding};
use crate::error::Result;
#[cfg(any(test, feature = "mock"))]
use crate::mock::MockEmbedder;
use crate::ollama::OllamaEmbedder;
use crate::openai::OpenAiEmbedder;

/// Generates a match over all `AnyEmbedder` variants, binding the inner embedder
/// and evaluating the given expression for each arm.
macro_rules! delegate_embedder {
    ($self:expr, |$e:ident| $expr:expr) => {
        match $self {
            AnyEmbedder::Ollama($e) => $expr,
            AnyEmbedder::OpenAi($e) => $expr,
            #[cfg(feature = "candle")]
            AnyEmbedder::Candle($e) => $expr,
            #[cfg(any(test, feature = "mock"))]
            AnyEmbedder::Mock($e) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyEmbedder {
    Ollama(OllamaEmbedder),
    OpenAi(OpenAiEmbedder),
    #[cfg(feature = "candle")]
    Candle(CandleEmbedder),
    #[cfg(any(test, feature = "mock"))]
    Mock(MockEmbedder),
}

impl Embedder for AnyEmbedder {
    fn name(&self) -> &str {
        delegate_embedder!(self, |e| e.name())
    }

    async fn init(&self) -> Result<usize> {
        delegate_embedder!(self, |e| e.init().await)
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        delegate_embedder!(self, |e| e.embed(text).await)
    }

    fn dimensions(&self) -> Option<usize> {
        delegate_embedder!(self, |e| e.dimensions())
    }
}

impl From<OllamaEmbedder> for AnyEmbedder {
    fn from(e: OllamaEmbedder) -> Self {
        Self::Ollama(e)
    }
}

impl From<OpenAiEmbedder> for AnyEmbedder {
    fn from(e: OpenAiEmbedder) -> Self {
        Self::OpenAi(e)
    }
}

#[cfg(feature = "candle")]
impl From<CandleEmbedder> for AnyEmbedder {
    fn from(e: CandleEmbedder) -> Self {
        Self::Candle(e)
    }
}

#[cfg(any(test, feature = "mock"))]
impl From<MockEmbedder> for AnyEmbedder {
    fn from(e: MockEmbedder) -> Self {
        Self::Mock(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delegates_to_inner_embedder() {
        let any: AnyEmbedder = MockEmbedder::new(12).with_name("local").into();
        assert_eq!(any.name(), "local");
        assert_eq!(any.dimensions(), None);
        assert_eq!(any.init().await.unwrap(), 12);
        assert_eq!(any.embed("x").await.unwrap().dimensions, 12);
        assert_eq!(any.dimensions(), Some(12));
    }

    #[test]
    fn clones_share_dimensions() {
        let any: AnyEmbedder = OllamaEmbedder::new("http://localhost:11434", "m".into()).into();
        let copy = any.clone();
        assert_eq!(copy.name(), "ollama");
        assert_eq!(copy.dimensions(), any.dimensions());
    }

    #[tokio::test]
    async fn failing_mock_propagates_error() {
        let any = AnyEmbedder::from(MockEmbedder::failing());
        assert!(any.embed("x").await.is_err());
    }
}
