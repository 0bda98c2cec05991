use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum VectorTableError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("count error: {0}")]
    Count(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

/// Conjunction of field conditions.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub must: Vec<FieldCondition>,
}

impl VectorFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    /// Filter with a single `field == value` requirement.
    #[must_use]
    pub fn text_eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::default().and(field, value)
    }

    #[must_use]
    pub fn and(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.must.push(FieldCondition {
            field: field.into(),
            value: value.into(),
        });
        self
    }
}

/// Matches a string field by equality, or a list field by containment.
#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A named-collection vector table. Object safe so stores can hold `Box<dyn VectorTable>`.
pub trait VectorTable: Send + Sync {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorTableError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorTableError>>;

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorTableError>>;

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorTableError>>;

    /// Remove every point matching `filter`, returning how many were removed.
    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<u64, VectorTableError>>;

    /// Number of points in `collection`; zero when it does not exist.
    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorTableError>>;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub(crate) fn matches_filter(
    payload: &HashMap<String, serde_json::Value>,
    filter: &VectorFilter,
) -> bool {
    filter.must.iter().all(|cond| {
        payload
            .get(&cond.field)
            .is_some_and(|val| field_matches(val, &cond.value))
    })
}

fn field_matches(val: &serde_json::Value, expected: &str) -> bool {
    match val {
        serde_json::Value::Array(items) => items.iter().any(|v| v.as_str() == Some(expected)),
        _ => val.as_str() == Some(expected),
    }
}

/// Sort by score descending and keep the best `limit`.
pub(crate) fn rank(mut scored: Vec<ScoredVectorPoint>, limit: u64) -> Vec<ScoredVectorPoint> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    scored
}
