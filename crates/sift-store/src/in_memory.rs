use std::collections::HashMap;
use std::sync::RwLock;

use crate::vector_table::{
    BoxFuture, ScoredVectorPoint, VectorFilter, VectorPoint, VectorTable, VectorTableError,
    cosine_similarity, matches_filter, rank,
};

struct StoredPoint {
    vector: Vec<f32>,
    payload: HashMap<String, serde_json::Value>,
}

#[derive(Default)]
struct Collection {
    points: HashMap<String, StoredPoint>,
}

/// Ephemeral table for tests and throwaway indexes.
#[derive(Default)]
pub struct InMemoryTable {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for InMemoryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTable").finish_non_exhaustive()
    }
}

impl VectorTable for InMemoryTable {
    fn ensure_collection(
        &self,
        collection: &str,
        _vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorTableError::Collection(e.to_string()))?;
            cols.entry(collection).or_default();
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorTableError::Collection(e.to_string()))?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorTableError::Upsert(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorTableError::Upsert(format!("collection {collection} not found"))
            })?;
            for p in points {
                col.points.insert(
                    p.id,
                    StoredPoint {
                        vector: p.vector,
                        payload: p.payload,
                    },
                );
            }
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorTableError::Search(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorTableError::Search(format!("collection {collection} not found"))
            })?;

            let filter = filter.unwrap_or_default();
            let scored = col
                .points
                .iter()
                .filter(|(_, sp)| matches_filter(&sp.payload, &filter))
                .map(|(id, sp)| ScoredVectorPoint {
                    id: id.clone(),
                    score: cosine_similarity(&vector, &sp.vector),
                    payload: sp.payload.clone(),
                })
                .collect();
            Ok(rank(scored, limit))
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<u64, VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorTableError::Delete(e.to_string()))?;
            let Some(col) = cols.get_mut(&collection) else {
                return Ok(0);
            };
            let before = col.points.len();
            col.points.retain(|_, sp| !matches_filter(&sp.payload, &filter));
            Ok((before - col.points.len()) as u64)
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorTableError::Count(e.to_string()))?;
            Ok(cols.get(&collection).map_or(0, |c| c.points.len() as u64))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>, source: &str) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vector,
            payload: HashMap::from([("source".into(), serde_json::json!(source))]),
        }
    }

    #[tokio::test]
    async fn ensure_collection_idempotent() {
        let table = InMemoryTable::new();
        assert!(!table.collection_exists("test").await.unwrap());
        table.ensure_collection("test", 3).await.unwrap();
        table.ensure_collection("test", 3).await.unwrap();
        assert!(table.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_and_search() {
        let table = InMemoryTable::new();
        table.ensure_collection("test", 3).await.unwrap();
        table
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0, 0.0], "a.ts"),
                    point("b", vec![0.0, 1.0, 0.0], "b.ts"),
                ],
            )
            .await
            .unwrap();

        let results = table
            .search("test", vec![1.0, 0.0, 0.0], 2, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!((results[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn upsert_same_id_replaces() {
        let table = InMemoryTable::new();
        table.ensure_collection("test", 2).await.unwrap();
        table
            .upsert("test", vec![point("a", vec![1.0, 0.0], "a.ts")])
            .await
            .unwrap();
        table
            .upsert("test", vec![point("a", vec![0.0, 1.0], "a.ts")])
            .await
            .unwrap();
        assert_eq!(table.count("test").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_with_filter() {
        let table = InMemoryTable::new();
        table.ensure_collection("test", 3).await.unwrap();
        table
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0, 0.0], "a.ts"),
                    point("b", vec![0.9, 0.1, 0.0], "b.ts"),
                ],
            )
            .await
            .unwrap();

        let filter = VectorFilter::text_eq("source", "b.ts");
        let results = table
            .search("test", vec![1.0, 0.0, 0.0], 10, Some(filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[tokio::test]
    async fn search_missing_collection_errors() {
        let table = InMemoryTable::new();
        assert!(table.search("nope", vec![1.0], 1, None).await.is_err());
    }

    #[tokio::test]
    async fn delete_by_filter_counts_removed() {
        let table = InMemoryTable::new();
        table.ensure_collection("test", 2).await.unwrap();
        table
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0], "a.ts"),
                    point("b", vec![0.0, 1.0], "a.ts"),
                    point("c", vec![1.0, 1.0], "c.ts"),
                ],
            )
            .await
            .unwrap();

        let removed = table
            .delete_by_filter("test", VectorFilter::text_eq("source", "a.ts"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(table.count("test").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn count_and_delete_on_missing_collection_are_zero() {
        let table = InMemoryTable::default();
        assert_eq!(table.count("any").await.unwrap(), 0);
        assert_eq!(
            table
                .delete_by_filter("any", VectorFilter::text_eq("source", "x"))
                .await
                .unwrap(),
            0
        );
    }
}
