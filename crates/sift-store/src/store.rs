use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use sift_embed::{AnyEmbedder, BASE_BACKOFF, DEFAULT_INIT_ATTEMPTS, Embedder, init_with_retry};
use tokio::sync::OnceCell;

use crate::error::Result;
use crate::types::{Entry, Mode, SearchFilter, SearchResult};
use crate::vector_table::{BoxFuture, ScoredVectorPoint, VectorFilter, VectorPoint, VectorTable};

/// Single-backend persistence and similarity search.
///
/// Object safe: the composite holds stores as `Arc<dyn VectorStore>`.
pub trait VectorStore: Send + Sync {
    /// Name used in logs and in `SearchResult::source_store`.
    fn name(&self) -> &str;

    /// Prepare the embedding backend and table.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be initialized.
    fn init(&self) -> BoxFuture<'_, Result<()>>;

    /// Embed and persist `entries`.
    ///
    /// # Errors
    ///
    /// Returns an error if any embedding fails or the table write fails.
    fn add<'a>(&'a self, entries: &'a [Entry]) -> BoxFuture<'a, Result<()>>;

    /// Nearest entries to `query`, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded or the table search fails.
    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
        filter: Option<&'a SearchFilter>,
    ) -> BoxFuture<'a, Result<Vec<SearchResult>>>;

    /// True when the table holds no rows or does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be queried.
    fn is_empty(&self) -> BoxFuture<'_, Result<bool>>;

    /// Remove every entry whose `source` equals `source`, returning how many went.
    ///
    /// # Errors
    ///
    /// Returns an error if the table delete fails.
    fn delete_by_source<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<usize>>;
}

/// [`VectorStore`] pairing one embedder with one collection of a [`VectorTable`].
///
/// The collection is created on the first `add`, once the vector size is known.
pub struct EmbeddingStore {
    name: String,
    embedder: AnyEmbedder,
    table: Box<dyn VectorTable>,
    collection: String,
    created: OnceCell<()>,
    init_attempts: u32,
    init_backoff: Duration,
}

impl std::fmt::Debug for EmbeddingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingStore")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("embedder", &self.embedder.name())
            .finish_non_exhaustive()
    }
}

impl EmbeddingStore {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        embedder: AnyEmbedder,
        table: Box<dyn VectorTable>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            embedder,
            table,
            collection: collection.into(),
            created: OnceCell::new(),
            init_attempts: DEFAULT_INIT_ATTEMPTS,
            init_backoff: BASE_BACKOFF,
        }
    }

    #[must_use]
    pub fn with_init_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.init_attempts = attempts;
        self.init_backoff = backoff;
        self
    }

    async fn ensure_created(&self, vector_size: usize) -> Result<()> {
        self.created
            .get_or_try_init(|| async {
                let size = u64::try_from(vector_size)?;
                self.table.ensure_collection(&self.collection, size).await?;
                tracing::debug!(
                    store = %self.name,
                    collection = %self.collection,
                    size,
                    "collection ready"
                );
                Ok::<_, crate::StoreError>(())
            })
            .await?;
        Ok(())
    }
}

impl VectorStore for EmbeddingStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            init_with_retry(&self.embedder, self.init_attempts, self.init_backoff).await?;
            if self.table.collection_exists(&self.collection).await? {
                let _ = self.created.set(());
            }
            Ok(())
        })
    }

    fn add<'a>(&'a self, entries: &'a [Entry]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if entries.is_empty() {
                return Ok(());
            }
            let mut points = Vec::with_capacity(entries.len());
            for entry in entries {
                let embedding = self.embedder.embed(&entry.text).await?;
                points.push(VectorPoint {
                    id: point_id(&entry.id),
                    vector: embedding.vector,
                    payload: entry_payload(entry)?,
                });
            }
            if let Some(first) = points.first() {
                self.ensure_created(first.vector.len()).await?;
            }
            let n = points.len();
            self.table.upsert(&self.collection, points).await?;
            tracing::debug!(store = %self.name, entries = n, "entries stored");
            Ok(())
        })
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
        filter: Option<&'a SearchFilter>,
    ) -> BoxFuture<'a, Result<Vec<SearchResult>>> {
        Box::pin(async move {
            if limit == 0 || !self.table.collection_exists(&self.collection).await? {
                return Ok(Vec::new());
            }
            let embedding = self.embedder.embed(query).await?;
            let hits = self
                .table
                .search(
                    &self.collection,
                    embedding.vector,
                    u64::try_from(limit)?,
                    filter.and_then(to_vector_filter),
                )
                .await?;
            Ok(hits
                .into_iter()
                .filter_map(|hit| to_search_result(hit, &self.name))
                .collect())
        })
    }

    fn is_empty(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.table.count(&self.collection).await? == 0) })
    }

    fn delete_by_source<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let removed = self
                .table
                .delete_by_filter(&self.collection, VectorFilter::text_eq("source", source))
                .await?;
            Ok(usize::try_from(removed)?)
        })
    }
}

/// Qdrant only accepts UUID or integer ids, so foreign ids are mapped to a UUIDv5.
fn point_id(id: &str) -> String {
    match uuid::Uuid::parse_str(id) {
        Ok(u) => u.to_string(),
        Err(_) => uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, id.as_bytes()).to_string(),
    }
}

fn entry_payload(entry: &Entry) -> Result<HashMap<String, serde_json::Value>> {
    match serde_json::to_value(entry)? {
        serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(crate::StoreError::Other(format!(
            "entry serialized to non-object: {other}"
        ))),
    }
}

fn to_vector_filter(filter: &SearchFilter) -> Option<VectorFilter> {
    let mut vf = VectorFilter::default();
    if let Some(ref tag) = filter.tag {
        vf = vf.and("tags", tag.as_str());
    }
    if let Some(ref session) = filter.session {
        vf = vf.and("session_id", session.as_str());
    }
    (!vf.is_empty()).then_some(vf)
}

#[derive(Deserialize)]
struct StoredEntry {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    mode: Mode,
    #[serde(default)]
    tags: Vec<String>,
    session_id: Option<String>,
    #[serde(default)]
    source: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

fn to_search_result(hit: ScoredVectorPoint, store: &str) -> Option<SearchResult> {
    let value = serde_json::Value::Object(hit.payload.into_iter().collect());
    let stored: StoredEntry = match serde_json::from_value(value) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(store, point = %hit.id, "skipping hit with malformed payload: {e}");
            return None;
        }
    };
    Some(SearchResult {
        id: stored.id,
        text: stored.text,
        score: f64::from(hit.score),
        mode: stored.mode,
        tags: stored.tags,
        session_id: stored.session_id,
        source: stored.source,
        date: stored.date,
        metadata: stored.metadata,
        source_store: Some(store.to_owned()),
    })
}
