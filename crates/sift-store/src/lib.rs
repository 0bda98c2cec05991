//! Entries, vector tables and stores for sift.
//!
//! An [`EmbeddingStore`] pairs one embedder with one [`VectorTable`] collection;
//! a [`CompositeVectorStore`] fans out over several of them and fuses their
//! rankings with Reciprocal Rank Fusion.

pub mod composite;
pub mod error;
pub mod in_memory;
pub mod qdrant;
pub mod sqlite;
pub mod store;
pub mod types;
pub mod vector_table;

pub use composite::{CompositeVectorStore, RRF_K, reciprocal_rank_fusion};
pub use error::{Result, StoreError};
pub use in_memory::InMemoryTable;
pub use qdrant::QdrantTable;
pub use sqlite::SqliteTable;
pub use store::{EmbeddingStore, VectorStore};
pub use types::{Entry, Mode, SearchFilter, SearchResult};
pub use vector_table::{
    FieldCondition, ScoredVectorPoint, VectorFilter, VectorPoint, VectorTable, VectorTableError,
};
