use crate::vector_table::VectorTableError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("embedding failed: {0}")]
    Embed(#[from] sift_embed::EmbedError),

    #[error("vector table error: {0}")]
    Table(#[from] VectorTableError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("integer conversion: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),

    #[error("composite store needs at least one backend")]
    NoBackends,

    #[error("{operation} failed on every backend: {}", failures.join("; "))]
    AllBackendsFailed {
        operation: &'static str,
        failures: Vec<String>,
    },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
