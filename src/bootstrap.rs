//! Store construction from config: one embedder and one table per backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use sift_embed::ollama::OllamaEmbedder;
use sift_embed::openai::OpenAiEmbedder;
use sift_embed::{AnyEmbedder, BASE_BACKOFF};
use sift_store::{
    CompositeVectorStore, EmbeddingStore, InMemoryTable, QdrantTable, SqliteTable, VectorStore,
    VectorTable,
};

use crate::config::{BackendConfig, BackendKind, Config, StoreKind};

/// `--config`, then `SIFT_CONFIG`, then `config/sift.toml`.
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("SIFT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/sift.toml")
}

pub fn create_embedder(backend: &BackendConfig) -> anyhow::Result<AnyEmbedder> {
    let embedder = match backend.kind {
        BackendKind::Ollama => {
            let base_url = backend.base_url().unwrap_or("http://localhost:11434");
            AnyEmbedder::from(
                OllamaEmbedder::new(base_url, backend.model.clone()).with_name(&backend.name),
            )
        }
        BackendKind::OpenAi => {
            let api_key = match &backend.api_key_env {
                Some(var) => Some(std::env::var(var).with_context(|| {
                    format!("backend {}: environment variable {var} is not set", backend.name)
                })?),
                None => None,
            };
            let base_url = backend
                .base_url()
                .context("openai backend requires base_url")?
                .to_owned();
            AnyEmbedder::from(
                OpenAiEmbedder::new(api_key, base_url, backend.model.clone())
                    .with_name(&backend.name),
            )
        }
        #[cfg(feature = "candle")]
        BackendKind::Candle => {
            use sift_embed::candle::{CandleEmbedder, auto_device};
            AnyEmbedder::from(
                CandleEmbedder::new(backend.model.clone(), auto_device()).with_name(&backend.name),
            )
        }
        #[cfg(not(feature = "candle"))]
        BackendKind::Candle => {
            anyhow::bail!(
                "backend {}: candle support not compiled in (enable the `candle` feature)",
                backend.name
            )
        }
        #[cfg(any(test, feature = "mock"))]
        BackendKind::Mock => AnyEmbedder::from(
            sift_embed::mock::MockEmbedder::default().with_name(&backend.name),
        ),
    };
    Ok(embedder)
}

/// Builds one table per backend; SQLite backends share a single pool.
struct TableFactory {
    kind: StoreKind,
    sqlite: Option<SqliteTable>,
    qdrant_url: String,
}

impl TableFactory {
    async fn new(config: &Config) -> anyhow::Result<Self> {
        let sqlite = if config.store.kind == StoreKind::Sqlite {
            let path = Path::new(&config.store.sqlite_path);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
            Some(
                SqliteTable::open(&config.store.sqlite_path)
                    .await
                    .with_context(|| format!("failed to open {}", config.store.sqlite_path))?,
            )
        } else {
            None
        };
        Ok(Self {
            kind: config.store.kind,
            sqlite,
            qdrant_url: config.store.qdrant_url.clone(),
        })
    }

    async fn table(&self) -> anyhow::Result<Box<dyn VectorTable>> {
        Ok(match self.kind {
            StoreKind::Sqlite => {
                let pool = self
                    .sqlite
                    .as_ref()
                    .context("sqlite table not opened")?
                    .pool()
                    .clone();
                Box::new(SqliteTable::with_pool(pool).await?)
            }
            StoreKind::Qdrant => Box::new(
                QdrantTable::new(&self.qdrant_url)
                    .with_context(|| format!("invalid Qdrant URL {}", self.qdrant_url))?,
            ),
            StoreKind::Memory => Box::new(InMemoryTable::new()),
        })
    }
}

/// Wrap every configured backend in an [`EmbeddingStore`] and fuse them.
///
/// # Errors
///
/// Returns an error if a backend or its table cannot be constructed.
pub async fn create_store(config: &Config) -> anyhow::Result<CompositeVectorStore> {
    let tables = TableFactory::new(config).await?;
    let mut stores: Vec<Arc<dyn VectorStore>> = Vec::with_capacity(config.backends.len());
    for backend in &config.backends {
        let embedder = create_embedder(backend)?;
        let store = EmbeddingStore::new(
            backend.name.clone(),
            embedder,
            tables.table().await?,
            config.store.collection_for(&backend.name),
        )
        .with_init_retry(backend.init_attempts, BASE_BACKOFF);
        tracing::debug!(backend = %backend.name, kind = ?backend.kind, "backend configured");
        stores.push(Arc::new(store));
    }
    Ok(CompositeVectorStore::new(stores)?)
}
