//! Serialized indexing queue: lock → read → chunk → replace entries.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::SecondsFormat;
use serde_json::{Map, Value};
use sift_store::{Entry, Mode, VectorStore};
use tokio::sync::{mpsc, oneshot};

use crate::chunker::{Chunk, chunk};
use crate::error::{IndexError, Result};
use crate::languages::Grammar;
use crate::lock::WriteLock;

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Entry `source` values are paths relative to this directory.
    pub root: PathBuf,
    pub mode: Mode,
    /// Appended to every entry, before the grammar tag.
    pub tags: Vec<String>,
    pub session_id: Option<String>,
    /// `None` waits for the write lock indefinitely.
    pub lock_timeout: Option<Duration>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            mode: Mode::default(),
            tags: Vec::new(),
            session_id: None,
            lock_timeout: None,
        }
    }
}

/// Result of one indexing job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The file was chunked and stored; `replaced` prior entries were removed first.
    Indexed { chunks: usize, replaced: usize },
    /// The file no longer exists and its entries were removed.
    Removed { removed: usize },
    /// Not a regular UTF-8 file.
    Skipped,
    Failed(String),
}

/// Running totals across every job the indexer has processed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_removed: usize,
    pub files_skipped: usize,
    pub chunks_created: usize,
    pub chunks_replaced: usize,
    pub errors: usize,
}

#[derive(Debug, Default)]
struct Counters {
    files_indexed: AtomicUsize,
    files_removed: AtomicUsize,
    files_skipped: AtomicUsize,
    chunks_created: AtomicUsize,
    chunks_replaced: AtomicUsize,
    errors: AtomicUsize,
}

impl Counters {
    fn record(&self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Indexed { chunks, replaced } => {
                self.files_indexed.fetch_add(1, Ordering::Relaxed);
                self.chunks_created.fetch_add(*chunks, Ordering::Relaxed);
                self.chunks_replaced.fetch_add(*replaced, Ordering::Relaxed);
            }
            JobOutcome::Removed { removed } => {
                self.files_removed.fetch_add(1, Ordering::Relaxed);
                self.chunks_replaced.fetch_add(*removed, Ordering::Relaxed);
            }
            JobOutcome::Skipped => {
                self.files_skipped.fetch_add(1, Ordering::Relaxed);
            }
            JobOutcome::Failed(_) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self) -> IndexReport {
        IndexReport {
            files_indexed: self.files_indexed.load(Ordering::Relaxed),
            files_removed: self.files_removed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            chunks_created: self.chunks_created.load(Ordering::Relaxed),
            chunks_replaced: self.chunks_replaced.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Completion handle for one enqueued job. Dropping it does not cancel the job.
#[derive(Debug)]
pub struct IndexTicket(oneshot::Receiver<JobOutcome>);

impl IndexTicket {
    /// Wait for the job to finish.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Stopped`] if the worker went away before running it.
    pub async fn wait(self) -> Result<JobOutcome> {
        self.0.await.map_err(|_| IndexError::Stopped)
    }
}

enum Message {
    Index {
        path: PathBuf,
        done: oneshot::Sender<JobOutcome>,
    },
    Barrier(oneshot::Sender<()>),
}

/// Handle to the single indexing worker. Clones feed the same FIFO queue.
#[derive(Debug, Clone)]
pub struct Indexer {
    tx: mpsc::UnboundedSender<Message>,
    counters: Arc<Counters>,
}

impl Indexer {
    /// Spawn the worker on the current Tokio runtime.
    ///
    /// `lock` must be the same [`WriteLock`] the external writer uses. The
    /// worker exits once every handle has been dropped and the queue drained.
    #[must_use]
    pub fn start(store: Arc<dyn VectorStore>, lock: WriteLock, config: IndexerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let worker = Worker {
            store,
            lock,
            config,
            counters: Arc::clone(&counters),
        };
        tokio::spawn(worker.run(rx));
        Self { tx, counters }
    }

    /// Queue `path` for (re-)indexing. Relative paths resolve against the root.
    pub fn enqueue(&self, path: impl Into<PathBuf>) -> IndexTicket {
        let (done, rx) = oneshot::channel();
        let path = path.into();
        if self.tx.send(Message::Index { path, done }).is_err() {
            tracing::warn!("indexer stopped, job dropped");
        }
        IndexTicket(rx)
    }

    /// Resolves once every job enqueued before this call has finished.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Stopped`] if the worker is gone.
    pub async fn idle(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Message::Barrier(done))
            .map_err(|_| IndexError::Stopped)?;
        rx.await.map_err(|_| IndexError::Stopped)
    }

    #[must_use]
    pub fn report(&self) -> IndexReport {
        self.counters.snapshot()
    }
}

struct Worker {
    store: Arc<dyn VectorStore>,
    lock: WriteLock,
    config: IndexerConfig,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = rx.recv().await {
            match message {
                Message::Index { path, done } => {
                    let outcome = self.process(&path).await;
                    self.counters.record(&outcome);
                    let _ = done.send(outcome);
                }
                Message::Barrier(done) => {
                    let _ = done.send(());
                }
            }
        }
        tracing::debug!("indexer queue closed");
    }

    async fn process(&self, path: &Path) -> JobOutcome {
        let path = if path.is_relative() {
            self.config.root.join(path)
        } else {
            path.to_path_buf()
        };
        let source = source_for(&self.config.root, &path);

        match self.index(&path, &source).await {
            Ok(outcome) => {
                tracing::debug!(path = %path.display(), ?outcome, "job finished");
                outcome
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "indexing failed: {e}");
                JobOutcome::Failed(e.to_string())
            }
        }
    }

    async fn index(&self, path: &Path, source: &str) -> Result<JobOutcome> {
        let _guard = self.lock.acquire_timeout(self.config.lock_timeout).await?;

        if !tokio::fs::try_exists(path).await? {
            let removed = self.store.delete_by_source(source).await?;
            tracing::debug!(source, removed, "file gone, entries removed");
            return Ok(JobOutcome::Removed { removed });
        }
        if !tokio::fs::metadata(path).await?.is_file() {
            return Ok(JobOutcome::Skipped);
        }
        let Ok(code) = String::from_utf8(tokio::fs::read(path).await?) else {
            tracing::debug!(source, "not valid UTF-8, skipped");
            return Ok(JobOutcome::Skipped);
        };

        let grammar = Grammar::from_path(path);
        let chunks = chunk(&code, grammar);
        let entries = self.entries(source, grammar, &chunks);

        let replaced = self.store.delete_by_source(source).await?;
        self.store.add(&entries).await?;

        Ok(JobOutcome::Indexed {
            chunks: entries.len(),
            replaced,
        })
    }

    fn entries(&self, source: &str, grammar: Grammar, chunks: &[Chunk]) -> Vec<Entry> {
        let date = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut tags = self.config.tags.clone();
        tags.push(grammar.id().to_owned());

        chunks
            .iter()
            .map(|c| Entry {
                id: entry_id(source, c),
                text: c.text.clone(),
                mode: self.config.mode,
                tags: tags.clone(),
                session_id: self.config.session_id.clone(),
                source: source.to_owned(),
                date: date.clone(),
                metadata: chunk_metadata(c, grammar),
            })
            .collect()
    }
}

/// Deterministic id for a chunk location, so re-indexing unchanged code
/// reproduces the same ids. The byte range keeps same-named declarations
/// sharing a line apart.
#[must_use]
pub fn entry_id(source: &str, chunk: &Chunk) -> String {
    let key = format!(
        "{source}|{}|{}|{}|{}|{}..{}",
        chunk.kind,
        chunk.name,
        chunk.start_line,
        chunk.end_line,
        chunk.start_byte,
        chunk.end_byte
    );
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

fn chunk_metadata(chunk: &Chunk, grammar: Grammar) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("kind".into(), Value::from(chunk.kind.as_str()));
    metadata.insert("name".into(), Value::from(chunk.name.as_str()));
    metadata.insert("startLine".into(), Value::from(chunk.start_line));
    metadata.insert("endLine".into(), Value::from(chunk.end_line));
    metadata.insert("language".into(), Value::from(grammar.id()));
    metadata.insert(
        "contentHash".into(),
        Value::from(blake3::hash(chunk.text.as_bytes()).to_hex().as_str()),
    );
    metadata
}

/// `path` relative to `root` with `/` separators; paths outside the root are
/// kept as given.
fn source_for(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    if rel.is_absolute() {
        return rel.to_string_lossy().into_owned();
    }
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
