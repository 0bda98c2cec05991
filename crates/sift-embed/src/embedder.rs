use std::future::Future;
use std::sync::{Arc, OnceLock};

use crate::error::{EmbedError, Result};

/// A single embedding vector together with its dimensionality.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub dimensions: usize,
}

impl Embedding {
    #[must_use]
    pub fn new(vector: Vec<f32>) -> Self {
        let dimensions = vector.len();
        Self { vector, dimensions }
    }
}

pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Load the model or verify connectivity, fixing the output dimensionality.
    ///
    /// Idempotent: calling it again after success returns the same dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached or the model fails to load.
    fn init(&self) -> impl Future<Output = Result<usize>> + Send;

    /// Embed `text` into an L2-normalized vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails or returns a vector of the wrong size.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Embedding>> + Send;

    /// Output dimensionality, known once `init` (or the first `embed`) succeeded.
    fn dimensions(&self) -> Option<usize>;
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dimensionality shared between clones of one embedder; set once, then enforced.
#[derive(Debug, Clone, Default)]
pub(crate) struct Dimensions(Arc<OnceLock<usize>>);

impl Dimensions {
    pub(crate) fn get(&self) -> Option<usize> {
        self.0.get().copied()
    }

    /// Record `actual` on first use; afterwards reject any other size.
    pub(crate) fn fix(&self, actual: usize) -> Result<usize> {
        let expected = *self.0.get_or_init(|| actual);
        if expected == actual {
            Ok(expected)
        } else {
            Err(EmbedError::DimensionMismatch { expected, actual })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector_untouched() {
        let mut v = vec![0.0; 4];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0; 4]);
    }

    #[test]
    fn dimensions_fixed_after_first_use() {
        let dims = Dimensions::default();
        assert_eq!(dims.get(), None);
        assert_eq!(dims.fix(384).unwrap(), 384);
        assert_eq!(dims.fix(384).unwrap(), 384);
        assert!(matches!(
            dims.fix(768),
            Err(EmbedError::DimensionMismatch {
                expected: 384,
                actual: 768
            })
        ));
    }

    #[test]
    fn dimensions_shared_between_clones() {
        let dims = Dimensions::default();
        let other = dims.clone();
        dims.fix(8).unwrap();
        assert_eq!(other.get(), Some(8));
    }

    #[test]
    fn embedding_new_records_len() {
        let e = Embedding::new(vec![0.1, 0.2, 0.3]);
        assert_eq!(e.dimensions, 3);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn normalized_vectors_have_unit_norm(
            v in proptest::collection::vec(-100.0f32..100.0, 1..64)
        ) {
            let mut v = v;
            prop_assume!(v.iter().any(|x| x.abs() > 1e-3));
            l2_normalize(&mut v);
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            prop_assert!((norm - 1.0).abs() < 1e-3);
        }
    }
}
