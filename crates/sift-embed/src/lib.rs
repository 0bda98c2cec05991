//! Text embedding backends used by the sift vector stores.
//!
//! Every backend implements [`Embedder`]; [`AnyEmbedder`] dispatches over the
//! configured ones without boxing.

pub mod any;
#[cfg(feature = "candle")]
pub mod candle;
pub mod embedder;
pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod retry;

pub use any::AnyEmbedder;
pub use embedder::{Embedder, Embedding, l2_normalize};
pub use error::{EmbedError, Result};
pub use retry::{BASE_BACKOFF, DEFAULT_INIT_ATTEMPTS, init_with_retry};
