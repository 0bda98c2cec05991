//! Test-only deterministic embedder.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::embedder::{Dimensions, Embedder, Embedding, l2_normalize};
use crate::error::{EmbedError, Result};

/// Hashes lowercase word tokens into buckets, so texts sharing words score higher.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    name: String,
    size: usize,
    dimensions: Dimensions,
    pub fail_embed: bool,
    init_failures: Arc<AtomicU32>,
    init_calls: Arc<AtomicU32>,
    /// Milliseconds to sleep before returning an embedding.
    pub delay_ms: u64,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            name: "mock".into(),
            size: size.max(1),
            dimensions: Dimensions::default(),
            fail_embed: false,
            init_failures: Arc::new(AtomicU32::new(0)),
            init_calls: Arc::new(AtomicU32::new(0)),
            delay_ms: 0,
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_embed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make the next `n` calls to `init` fail.
    #[must_use]
    pub fn with_init_failures(self, n: u32) -> Self {
        self.init_failures.store(n, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn init_calls(&self) -> u32 {
        self.init_calls.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.size];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hasher.finish() % self.size as u64) as usize;
            vector[bucket] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Embedder for MockEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<usize> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.init_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.init_failures.store(pending - 1, Ordering::SeqCst);
            return Err(EmbedError::Other("mock init failure".into()));
        }
        self.dimensions.fix(self.size)
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_embed {
            return Err(EmbedError::Other("mock embedding error".into()));
        }
        let vector = self.vectorize(text);
        self.dimensions.fix(vector.len())?;
        Ok(Embedding::new(vector))
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn same_text_same_vector() {
        let e = MockEmbedder::new(32);
        let a = e.embed("function foo").await.unwrap();
        let b = e.embed("function foo").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dimensions, 32);
    }

    #[tokio::test]
    async fn shared_tokens_score_higher() {
        let e = MockEmbedder::new(256);
        let query = e.embed("foo").await.unwrap();
        let hit = e.embed("function foo() { return 1; }").await.unwrap();
        let miss = e.embed("class Bar {}").await.unwrap();
        assert!(cosine(&query.vector, &hit.vector) > cosine(&query.vector, &miss.vector));
    }

    #[tokio::test]
    async fn failing_embedder_errors() {
        let e = MockEmbedder::failing();
        assert!(e.embed("anything").await.is_err());
    }

    #[tokio::test]
    async fn init_fixes_dimensions() {
        let e = MockEmbedder::new(16);
        assert_eq!(e.dimensions(), None);
        assert_eq!(e.init().await.unwrap(), 16);
        assert_eq!(e.dimensions(), Some(16));
    }
}
