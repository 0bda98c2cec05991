//! Qdrant-backed vector table.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PointStruct, ScoredPoint,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder, point_id::PointIdOptions,
    value::Kind,
};

use crate::vector_table::{
    BoxFuture, ScoredVectorPoint, VectorFilter, VectorPoint, VectorTable, VectorTableError,
};

/// Payload fields that get a keyword index so filters run inside Qdrant.
const INDEXED_FIELDS: &[&str] = &["source", "tags", "session_id"];

#[derive(Clone)]
pub struct QdrantTable {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantTable").finish_non_exhaustive()
    }
}

impl QdrantTable {
    /// Create a client for the Qdrant gRPC endpoint at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str) -> Result<Self, VectorTableError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorTableError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    async fn create(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> Result<(), qdrant_client::QdrantError> {
        if self.client.collection_exists(collection).await? {
            return Ok(());
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
            )
            .await?;
        for field in INDEXED_FIELDS {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    collection,
                    *field,
                    FieldType::Keyword,
                ))
                .await?;
        }
        Ok(())
    }

    async fn exact_count(
        &self,
        collection: &str,
        filter: Option<Filter>,
    ) -> Result<u64, qdrant_client::QdrantError> {
        let mut builder = CountPointsBuilder::new(collection).exact(true);
        if let Some(f) = filter {
            builder = builder.filter(f);
        }
        let response = self.client.count(builder).await?;
        Ok(response.result.map_or(0, |r| r.count))
    }
}

impl VectorTable for QdrantTable {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.create(&collection, vector_size)
                .await
                .map_err(|e| VectorTableError::Collection(e.to_string()))
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .collection_exists(&collection)
                .await
                .map_err(|e| VectorTableError::Collection(e.to_string()))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let qdrant_points = points
                .into_iter()
                .map(|p| {
                    let payload: HashMap<String, qdrant_client::qdrant::Value> =
                        serde_json::from_value(serde_json::Value::Object(
                            p.payload.into_iter().collect(),
                        ))
                        .map_err(|e| VectorTableError::Serialization(e.to_string()))?;
                    Ok(PointStruct::new(p.id, p.vector, payload))
                })
                .collect::<Result<Vec<_>, VectorTableError>>()?;
            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, qdrant_points).wait(true))
                .await
                .map_err(|e| VectorTableError::Upsert(e.to_string()))?;
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
            let mut builder =
                SearchPointsBuilder::new(&collection, vector, limit).with_payload(true);
            if let Some(f) = filter.filter(|f| !f.is_empty()) {
                builder = builder.filter(vector_filter_to_qdrant(f));
            }
            let results = self
                .client
                .search_points(builder)
                .await
                .map_err(|e| VectorTableError::Search(e.to_string()))?;
            Ok(results.result.into_iter().map(scored_point_to_vector).collect())
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<u64, VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let delete_err =
                |e: qdrant_client::QdrantError| VectorTableError::Delete(e.to_string());
            if !self
                .client
                .collection_exists(&collection)
                .await
                .map_err(delete_err)?
            {
                return Ok(0);
            }
            let filter = vector_filter_to_qdrant(filter);
            let matching = self
                .exact_count(&collection, Some(filter.clone()))
                .await
                .map_err(delete_err)?;
            if matching == 0 {
                return Ok(0);
            }
            self.client
                .delete_points(DeletePointsBuilder::new(&collection).points(filter).wait(true))
                .await
                .map_err(delete_err)?;
            Ok(matching)
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorTableError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let count_err = |e: qdrant_client::QdrantError| VectorTableError::Count(e.to_string());
            if !self
                .client
                .collection_exists(&collection)
                .await
                .map_err(count_err)?
            {
                return Ok(0);
            }
            self.exact_count(&collection, None).await.map_err(count_err)
        })
    }
}

// `matches` on an array payload field is containment in Qdrant.
fn vector_filter_to_qdrant(filter: VectorFilter) -> Filter {
    Filter::must(
        filter
            .must
            .into_iter()
            .map(|cond| Condition::matches(cond.field, cond.value)),
    )
}

fn kind_to_json(kind: Kind) -> Option<serde_json::Value> {
    Some(match kind {
        Kind::NullValue(_) => serde_json::Value::Null,
        Kind::BoolValue(b) => serde_json::Value::Bool(b),
        Kind::IntegerValue(i) => serde_json::Value::Number(i.into()),
        Kind::DoubleValue(d) => serde_json::Number::from_f64(d).map(serde_json::Value::Number)?,
        Kind::StringValue(s) => serde_json::Value::String(s),
        Kind::ListValue(list) => serde_json::Value::Array(
            list.values
                .into_iter()
                .filter_map(|v| v.kind.and_then(kind_to_json))
                .collect(),
        ),
        Kind::StructValue(s) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .filter_map(|(k, v)| Some((k, kind_to_json(v.kind?)?)))
                .collect(),
        ),
    })
}

fn scored_point_to_vector(point: ScoredPoint) -> ScoredVectorPoint {
    let payload = point
        .payload
        .into_iter()
        .filter_map(|(k, v)| Some((k, kind_to_json(v.kind?)?)))
        .collect();

    let id = match point.id.and_then(|pid| pid.point_id_options) {
        Some(PointIdOptions::Uuid(u)) => u,
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    };

    ScoredVectorPoint {
        id,
        score: point.score,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::{ListValue, Value};

    #[test]
    fn new_valid_url() {
        assert!(QdrantTable::new("http://localhost:6334").is_ok());
    }

    #[test]
    fn new_invalid_url() {
        assert!(QdrantTable::new("not a valid url").is_err());
    }

    #[test]
    fn debug_format() {
        let table = QdrantTable::new("http://localhost:6334").unwrap();
        assert!(format!("{table:?}").contains("QdrantTable"));
    }

    #[test]
    fn list_payload_converts_to_json_array() {
        let kind = Kind::ListValue(ListValue {
            values: vec![Value::from("typescript"), Value::from("api")],
        });
        assert_eq!(
            kind_to_json(kind).unwrap(),
            serde_json::json!(["typescript", "api"])
        );
    }

    #[test]
    fn filter_conversion_keeps_every_condition() {
        let filter = VectorFilter::text_eq("tags", "api").and("session_id", "s1");
        let q = vector_filter_to_qdrant(filter);
        assert_eq!(q.must.len(), 2);
        assert!(q.must_not.is_empty());
    }
}
