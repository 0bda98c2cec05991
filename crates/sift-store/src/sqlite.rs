//! Single-file persistent table. Vectors are stored as little-endian `f32`
//! blobs and searched by brute-force cosine similarity; filters run in SQL.

use std::collections::HashMap;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::vector_table::{
    BoxFuture, ScoredVectorPoint, VectorFilter, VectorPoint, VectorTable, VectorTableError,
    cosine_similarity, rank,
};

// `source` is copied out of the payload so per-file deletes hit an index.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS collections (\
        name TEXT PRIMARY KEY NOT NULL, \
        vector_size INTEGER NOT NULL)",
    "CREATE TABLE IF NOT EXISTS points (\
        collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE, \
        id TEXT NOT NULL, \
        source TEXT NOT NULL DEFAULT '', \
        vector BLOB NOT NULL, \
        payload TEXT NOT NULL, \
        PRIMARY KEY (collection, id))",
    "CREATE INDEX IF NOT EXISTS points_by_source ON points (collection, source)",
];

type Payload = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone)]
pub struct SqliteTable {
    pool: SqlitePool,
}

impl SqliteTable {
    /// Open (or create) the database at `path` and create the schema.
    ///
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot be created.
    pub async fn open(path: &str) -> Result<Self, VectorTableError> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)
            .map_err(connection)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // a second connection to ":memory:" would see a different database
        let max_connections = if path == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
            .map_err(connection)?;

        Self::with_pool(pool).await
    }

    /// Use an existing pool, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, VectorTableError> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&pool)
                .await
                .map_err(|e| VectorTableError::Collection(e.to_string()))?;
        }
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load(
        &self,
        collection: &str,
        filter: &VectorFilter,
    ) -> Result<Vec<(String, Vec<u8>, Payload)>, sqlx::Error> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, vector, payload FROM points WHERE collection = ",
        );
        qb.push_bind(collection.to_owned());
        push_filter(&mut qb, filter);
        let rows: Vec<(String, Vec<u8>, String)> =
            qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, blob, payload)| match serde_json::from_str(&payload) {
                Ok(payload) => Some((id, blob, payload)),
                Err(e) => {
                    tracing::warn!(collection, id = %id, "skipping corrupt payload: {e}");
                    None
                }
            })
            .collect())
    }
}

/// One `AND` clause per condition. Scalars match by equality and arrays by
/// containment, as in the in-memory table.
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &VectorFilter) {
    for cond in &filter.must {
        if cond.field == "source" {
            qb.push(" AND source = ").push_bind(cond.value.clone());
        } else {
            qb.push(" AND EXISTS (SELECT 1 FROM json_each(payload, ")
                .push_bind(format!("$.\"{}\"", cond.field))
                .push(") WHERE json_each.value = ")
                .push_bind(cond.value.clone())
                .push(")");
        }
    }
}

fn connection(e: sqlx::Error) -> VectorTableError {
    VectorTableError::Connection(e.to_string())
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

impl VectorTable for SqliteTable {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let collection_err = |e: sqlx::Error| VectorTableError::Collection(e.to_string());
            let size = i64::try_from(vector_size)
                .map_err(|e| VectorTableError::Collection(e.to_string()))?;
            sqlx::query(
                "INSERT INTO collections (name, vector_size) VALUES (?, ?) \
                 ON CONFLICT(name) DO NOTHING",
            )
            .bind(&collection)
            .bind(size)
            .execute(&self.pool)
            .await
            .map_err(collection_err)?;

            let stored: i64 =
                sqlx::query_scalar("SELECT vector_size FROM collections WHERE name = ?")
                    .bind(&collection)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(collection_err)?;
            if stored != size {
                return Err(VectorTableError::Collection(format!(
                    "collection {collection} holds {stored}-dimensional vectors, got {size}"
                )));
            }
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let found: Option<i64> =
                sqlx::query_scalar("SELECT vector_size FROM collections WHERE name = ?")
                    .bind(&collection)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| VectorTableError::Collection(e.to_string()))?;
            Ok(found.is_some())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let upsert_err = |e: sqlx::Error| VectorTableError::Upsert(e.to_string());
            let mut tx = self.pool.begin().await.map_err(upsert_err)?;
            for p in points {
                let source = p
                    .payload
                    .get("source")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                let payload = serde_json::to_string(&p.payload)
                    .map_err(|e| VectorTableError::Serialization(e.to_string()))?;
                sqlx::query(
                    "INSERT INTO points (collection, id, source, vector, payload) \
                     VALUES (?, ?, ?, ?, ?) \
                     ON CONFLICT(collection, id) DO UPDATE SET \
                     source = excluded.source, vector = excluded.vector, \
                     payload = excluded.payload",
                )
                .bind(&collection)
                .bind(&p.id)
                .bind(source)
                .bind(encode_vector(&p.vector))
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(upsert_err)?;
            }
            tx.commit().await.map_err(upsert_err)?;
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
            let rows = self
                .load(&collection, &filter.unwrap_or_default())
                .await
                .map_err(|e| VectorTableError::Search(e.to_string()))?;
            let scored = rows
                .into_iter()
                .map(|(id, blob, payload)| ScoredVectorPoint {
                    id,
                    score: cosine_similarity(&vector, &decode_vector(&blob)),
                    payload,
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
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM points WHERE collection = ");
            qb.push_bind(collection);
            push_filter(&mut qb, &filter);
            let done = qb
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| VectorTableError::Delete(e.to_string()))?;
            Ok(done.rows_affected())
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM points WHERE collection = ?")
                .bind(&collection)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| VectorTableError::Count(e.to_string()))?;
            u64::try_from(n).map_err(|e| VectorTableError::Count(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn point(id: &str, vector: Vec<f32>, tags: &[&str]) -> VectorPoint {
        sourced(id, vector, "a.ts", tags)
    }

    fn sourced(id: &str, vector: Vec<f32>, source: &str, tags: &[&str]) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vector,
            payload: HashMap::from([
                ("source".into(), serde_json::json!(source)),
                ("tags".into(), serde_json::json!(tags)),
            ]),
        }
    }

    #[test]
    fn vector_blob_round_trip() {
        let v = vec![0.25, -1.5, 3.0];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }

    #[tokio::test]
    async fn wal_journal_mode_enabled_on_file_db() {
        let file = NamedTempFile::new().expect("tempfile");
        let path = file.path().to_str().expect("valid path");

        let table = SqliteTable::open(path).await.expect("SqliteTable::open");

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(table.pool())
            .await
            .expect("PRAGMA query");

        assert_eq!(mode, "wal", "expected WAL journal mode, got: {mode}");
    }

    #[tokio::test]
    async fn collection_lifecycle() {
        let table = SqliteTable::open(":memory:").await.unwrap();
        assert!(!table.collection_exists("c").await.unwrap());
        table.ensure_collection("c", 2).await.unwrap();
        table.ensure_collection("c", 2).await.unwrap();
        assert!(table.collection_exists("c").await.unwrap());
        assert_eq!(table.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_and_filters_tags() {
        let table = SqliteTable::open(":memory:").await.unwrap();
        table.ensure_collection("c", 2).await.unwrap();
        table
            .upsert(
                "c",
                vec![
                    point("a", vec![1.0, 0.0], &["typescript"]),
                    point("b", vec![0.7, 0.7], &["typescript", "api"]),
                    point("c", vec![0.0, 1.0], &["markdown"]),
                ],
            )
            .await
            .unwrap();

        let all = table.search("c", vec![1.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<_> = all.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);

        let tagged = table
            .search("c", vec![1.0, 0.0], 10, Some(VectorFilter::text_eq("tags", "api")))
            .await
            .unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, "b");
        assert_eq!(tagged[0].payload["source"], "a.ts");
    }

    #[tokio::test]
    async fn upsert_replaces_and_delete_counts() {
        let table = SqliteTable::open(":memory:").await.unwrap();
        table.ensure_collection("c", 2).await.unwrap();
        table
            .upsert("c", vec![point("a", vec![1.0, 0.0], &[])])
            .await
            .unwrap();
        table
            .upsert("c", vec![point("a", vec![0.0, 1.0], &[]), point("b", vec![1.0, 1.0], &[])])
            .await
            .unwrap();
        assert_eq!(table.count("c").await.unwrap(), 2);

        let removed = table
            .delete_by_filter("c", VectorFilter::text_eq("source", "a.ts"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(table.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ensure_collection_rejects_changed_vector_size() {
        let table = SqliteTable::open(":memory:").await.unwrap();
        table.ensure_collection("c", 2).await.unwrap();
        let err = table.ensure_collection("c", 3).await.unwrap_err();
        assert!(matches!(err, VectorTableError::Collection(_)), "{err}");
        assert!(err.to_string().contains("2-dimensional"));
        table.ensure_collection("c", 2).await.unwrap();
    }

    #[tokio::test]
    async fn delete_by_source_leaves_other_files() {
        let table = SqliteTable::open(":memory:").await.unwrap();
        table.ensure_collection("c", 2).await.unwrap();
        table
            .upsert(
                "c",
                vec![
                    sourced("a1", vec![1.0, 0.0], "a.ts", &[]),
                    sourced("a2", vec![0.0, 1.0], "a.ts", &[]),
                    sourced("b1", vec![1.0, 1.0], "b.ts", &[]),
                ],
            )
            .await
            .unwrap();

        let removed = table
            .delete_by_filter("c", VectorFilter::text_eq("source", "a.ts"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        let left = table.search("c", vec![1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "b1");
        assert_eq!(
            table
                .delete_by_filter("c", VectorFilter::text_eq("source", "a.ts"))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn source_delete_uses_the_source_index() {
        let table = SqliteTable::open(":memory:").await.unwrap();
        let plan: Vec<(i64, i64, i64, String)> = sqlx::query_as(
            "EXPLAIN QUERY PLAN DELETE FROM points WHERE collection = ? AND source = ?",
        )
        .bind("c")
        .bind("a.ts")
        .fetch_all(table.pool())
        .await
        .unwrap();
        assert!(
            plan.iter().any(|(_, _, _, detail)| detail.contains("points_by_source")),
            "{plan:?}"
        );
    }

    #[tokio::test]
    async fn upsert_moves_point_to_new_source() {
        let table = SqliteTable::open(":memory:").await.unwrap();
        table.ensure_collection("c", 2).await.unwrap();
        table
            .upsert("c", vec![sourced("x", vec![1.0, 0.0], "old.ts", &[])])
            .await
            .unwrap();
        table
            .upsert("c", vec![sourced("x", vec![1.0, 0.0], "new.ts", &[])])
            .await
            .unwrap();
        let old = table
            .delete_by_filter("c", VectorFilter::text_eq("source", "old.ts"))
            .await
            .unwrap();
        assert_eq!(old, 0);
        assert_eq!(table.count("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn tag_and_session_filters_combine_in_sql() {
        let table = SqliteTable::open(":memory:").await.unwrap();
        table.ensure_collection("c", 2).await.unwrap();
        let mut with_session = point("a", vec![1.0, 0.0], &["api"]);
        with_session
            .payload
            .insert("session_id".into(), serde_json::json!("s1"));
        let mut null_session = point("b", vec![1.0, 0.0], &["api"]);
        null_session
            .payload
            .insert("session_id".into(), serde_json::Value::Null);
        table
            .upsert("c", vec![with_session, null_session])
            .await
            .unwrap();

        let filter = VectorFilter::text_eq("tags", "api").and("session_id", "s1");
        let hits = table
            .search("c", vec![1.0, 0.0], 10, Some(filter))
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a"]);

        let removed = table
            .delete_by_filter("c", VectorFilter::text_eq("tags", "API"))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let table = SqliteTable::open(":memory:").await.unwrap();
        table.ensure_collection("one", 2).await.unwrap();
        table.ensure_collection("two", 2).await.unwrap();
        table
            .upsert("one", vec![point("a", vec![1.0, 0.0], &[])])
            .await
            .unwrap();
        assert_eq!(table.count("one").await.unwrap(), 1);
        assert_eq!(table.count("two").await.unwrap(), 0);
        assert!(table.search("two", vec![1.0, 0.0], 5, None).await.unwrap().is_empty());
    }
}
