use std::path::PathBuf;

use super::{Config, StoreKind};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SIFT_INDEX_ROOT") {
            self.index.root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SIFT_DEBOUNCE_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                self.index.debounce_ms = ms;
            } else {
                tracing::warn!("ignoring invalid SIFT_DEBOUNCE_MS value: {v}");
            }
        }
        if let Ok(v) = std::env::var("SIFT_STORE_KIND") {
            let value = serde_json::Value::String(v.clone());
            if let Ok(kind) = serde_json::from_value::<StoreKind>(value) {
                self.store.kind = kind;
            } else {
                tracing::warn!("ignoring invalid SIFT_STORE_KIND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("SIFT_SQLITE_PATH") {
            self.store.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("SIFT_QDRANT_URL") {
            self.store.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("SIFT_LOG_LEVEL") {
            self.log.level = v;
        }
    }
}
