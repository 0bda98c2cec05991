use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sift_store::Mode;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            store: StoreConfig::default(),
            backends: default_backends(),
            log: LogConfig::default(),
        }
    }
}

fn default_backends() -> Vec<BackendConfig> {
    vec![BackendConfig {
        name: "ollama".into(),
        kind: BackendKind::Ollama,
        model: "nomic-embed-text".into(),
        base_url: None,
        api_key_env: None,
        init_attempts: default_init_attempts(),
    }]
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_root")]
    pub root: PathBuf,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_timeout_secs: Option<u64>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

fn default_index_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_extensions() -> Vec<String> {
    ["md", "ts", "tsx", "js", "mjs"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: default_index_root(),
            debounce_ms: default_debounce_ms(),
            extensions: default_extensions(),
            lock_timeout_secs: None,
            mode: Mode::default(),
            tags: Vec::new(),
            session_id: None,
        }
    }
}

impl IndexConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Qdrant,
    Memory,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,
}

fn default_sqlite_path() -> String {
    ".sift/index.db".into()
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_collection_prefix() -> String {
    "sift".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            sqlite_path: default_sqlite_path(),
            qdrant_url: default_qdrant_url(),
            collection_prefix: default_collection_prefix(),
        }
    }
}

impl StoreConfig {
    /// Each backend gets its own collection, since vector sizes differ.
    #[must_use]
    pub fn collection_for(&self, backend: &str) -> String {
        format!("{}_{backend}", self.collection_prefix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ollama,
    OpenAi,
    Candle,
    #[cfg(any(test, feature = "mock"))]
    Mock,
}

impl BackendKind {
    #[must_use]
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::Ollama => Some("http://localhost:11434"),
            Self::OpenAi => Some("https://api.openai.com/v1"),
            #[cfg(any(test, feature = "mock"))]
            Self::Mock => None,
            Self::Candle => None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BackendConfig {
    pub name: String,
    pub kind: BackendKind,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_init_attempts")]
    pub init_attempts: u32,
}

fn default_init_attempts() -> u32 {
    3
}

impl BackendConfig {
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .or_else(|| self.kind.default_base_url())
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
