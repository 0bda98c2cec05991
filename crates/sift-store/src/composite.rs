//! Fan-out over several [`VectorStore`]s with rank fusion on search.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::error::{Result, StoreError};
use crate::store::VectorStore;
use crate::types::{Entry, SearchFilter, SearchResult};
use crate::vector_table::BoxFuture;

/// Damping constant for Reciprocal Rank Fusion.
pub const RRF_K: usize = 60;

/// Combine ranked lists by summing `1 / (k + rank)` per list, rank being 1-based.
///
/// The first list to report an id decides which copy of its fields is kept.
/// Results are sorted by fused score, descending, and truncated to `limit`;
/// ties keep first-seen order.
///
/// # Examples
///
/// ```
/// use sift_store::composite::reciprocal_rank_fusion;
///
/// let results = reciprocal_rank_fusion(Vec::new(), 60, 10);
/// assert!(results.is_empty());
/// ```
#[must_use]
pub fn reciprocal_rank_fusion(
    lists: Vec<Vec<SearchResult>>,
    k: usize,
    limit: usize,
) -> Vec<SearchResult> {
    let mut fused: Vec<SearchResult> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for list in lists {
        for (rank, mut hit) in list.into_iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let contribution = 1.0 / (k as f64 + rank as f64 + 1.0);
            if let Some(&i) = position.get(&hit.id) {
                fused[i].score += contribution;
            } else {
                position.insert(hit.id.clone(), fused.len());
                hit.score = contribution;
                fused.push(hit);
            }
        }
    }

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(limit);
    fused
}

/// Makes N stores behave as one: writes go to all of them, reads are fused.
///
/// Writes and reads succeed as long as one store does; failures of the others
/// are logged. `init` is the exception and requires every store.
pub struct CompositeVectorStore {
    stores: Vec<Arc<dyn VectorStore>>,
}

impl std::fmt::Debug for CompositeVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.stores.iter().map(|s| s.name()).collect();
        f.debug_struct("CompositeVectorStore")
            .field("stores", &names)
            .finish()
    }
}

impl CompositeVectorStore {
    /// # Errors
    ///
    /// Returns [`StoreError::NoBackends`] if `stores` is empty.
    pub fn new(stores: Vec<Arc<dyn VectorStore>>) -> Result<Self> {
        if stores.is_empty() {
            return Err(StoreError::NoBackends);
        }
        Ok(Self { stores })
    }

    #[must_use]
    pub fn stores(&self) -> &[Arc<dyn VectorStore>] {
        &self.stores
    }

    /// Keep successful results, log the failures, and error only if nothing succeeded.
    fn tolerate<T>(&self, operation: &'static str, results: Vec<Result<T>>) -> Result<Vec<T>> {
        let mut ok = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (store, result) in self.stores.iter().zip(results) {
            match result {
                Ok(v) => ok.push(v),
                Err(e) => {
                    tracing::warn!(store = store.name(), operation, "backend failed: {e}");
                    failures.push(format!("{}: {e}", store.name()));
                }
            }
        }
        if ok.is_empty() {
            return Err(StoreError::AllBackendsFailed {
                operation,
                failures,
            });
        }
        Ok(ok)
    }
}

impl VectorStore for CompositeVectorStore {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn init(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let results = join_all(self.stores.iter().map(|s| s.init())).await;
            for (store, result) in self.stores.iter().zip(results) {
                if let Err(e) = result {
                    tracing::error!(store = store.name(), "store init failed: {e}");
                    return Err(e);
                }
            }
            tracing::info!(stores = self.stores.len(), "vector stores ready");
            Ok(())
        })
    }

    fn add<'a>(&'a self, entries: &'a [Entry]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let results = join_all(self.stores.iter().map(|s| s.add(entries))).await;
            self.tolerate("add", results)?;
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
            let fetch = limit.saturating_mul(2);
            let results =
                join_all(self.stores.iter().map(|s| s.search(query, fetch, filter))).await;
            let lists = self.tolerate("search", results)?;
            Ok(reciprocal_rank_fusion(lists, RRF_K, limit))
        })
    }

    fn is_empty(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let results = join_all(self.stores.iter().map(|s| s.is_empty())).await;
            let answers = self.tolerate("is_empty", results)?;
            Ok(answers.into_iter().all(|empty| empty))
        })
    }

    fn delete_by_source<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let results =
                join_all(self.stores.iter().map(|s| s.delete_by_source(source))).await;
            let counts = self.tolerate("delete_by_source", results)?;
            Ok(counts.into_iter().sum())
        })
    }
}
