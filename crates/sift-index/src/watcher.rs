//! Filesystem watching with per-path debounce, plus one-shot backfill scans.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{IndexError, Result};
use crate::indexer::Indexer;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

type Sink = Arc<dyn Fn(PathBuf) + Send + Sync>;

#[derive(Default)]
struct Timers {
    pending: HashMap<PathBuf, (u64, JoinHandle<()>)>,
    next_generation: u64,
    closed: bool,
}

/// Per-path trailing-edge debounce: `sink` runs once per path after `window`
/// of silence for that path.
#[derive(Clone)]
pub struct Debouncer {
    window: Duration,
    sink: Sink,
    timers: Arc<Mutex<Timers>>,
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.window)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl Debouncer {
    pub fn new(window: Duration, sink: impl Fn(PathBuf) + Send + Sync + 'static) -> Self {
        Self {
            window,
            sink: Arc::new(sink),
            timers: Arc::new(Mutex::new(Timers::default())),
        }
    }

    /// Start or restart the timer for `path`. Ignored after [`close`](Self::close).
    pub fn touch(&self, path: PathBuf) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        if timers.closed {
            return;
        }
        timers.next_generation += 1;
        let generation = timers.next_generation;
        if let Some((_, previous)) = timers.pending.remove(&path) {
            previous.abort();
        }

        let shared = Arc::clone(&self.timers);
        let sink = Arc::clone(&self.sink);
        let window = self.window;
        let key = path.clone();
        // the sink runs under the mutex so `close` never returns while one is in flight
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let mut timers = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if timers.closed {
                return;
            }
            if timers
                .pending
                .get(&key)
                .is_some_and(|(g, _)| *g == generation)
            {
                timers.pending.remove(&key);
                sink(key);
            }
        });
        timers.pending.insert(path, (generation, handle));
    }

    /// Cancel every pending timer. No sink call happens after this returns.
    pub fn close(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers.closed = true;
        for (_, (_, handle)) in timers.pending.drain() {
            handle.abort();
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub debounce: Duration,
    /// Lowercase extensions without the dot. Empty accepts every file.
    pub extensions: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            extensions: ["md", "ts", "tsx", "js", "mjs"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Summary of a backfill scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub files_enqueued: usize,
    pub errors: Vec<String>,
}

struct Active {
    _watcher: RecommendedWatcher,
    pump: JoinHandle<()>,
}

/// Turns filesystem events under the watched roots into debounced
/// [`Indexer::enqueue`] calls.
pub struct IndexWatcher {
    indexer: Indexer,
    config: WatcherConfig,
    debouncer: Debouncer,
    active: Mutex<Vec<Active>>,
}

impl std::fmt::Debug for IndexWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexWatcher")
            .field("config", &self.config)
            .field("debouncer", &self.debouncer)
            .finish_non_exhaustive()
    }
}

impl IndexWatcher {
    #[must_use]
    pub fn new(indexer: Indexer, config: WatcherConfig) -> Self {
        let sink = indexer.clone();
        let debouncer = Debouncer::new(config.debounce, move |path| {
            tracing::debug!(path = %path.display(), "debounce elapsed, enqueueing");
            let _ = sink.enqueue(path);
        });
        Self {
            indexer,
            config,
            debouncer,
            active: Mutex::new(Vec::new()),
        }
    }

    /// Watch `paths` recursively. Dotfiles and dot-directories below each root
    /// are ignored; create, modify and remove events are forwarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS watcher cannot be created or a path cannot be watched.
    pub fn start<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(64);
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.blocking_send(res);
        })?;

        let roots: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        for root in &roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }

        let debouncer = self.debouncer.clone();
        let extensions = self.config.extensions.clone();
        let watched = roots.len();
        let pump = tokio::spawn(async move {
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => {
                        for path in relevant_paths(&event, &roots, &extensions) {
                            debouncer.touch(path);
                        }
                    }
                    Err(e) => tracing::warn!("watch error: {e}"),
                }
            }
        });

        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Active {
                _watcher: watcher,
                pump,
            });
        tracing::info!(roots = watched, "watching for changes");
        Ok(())
    }

    /// Walk `dir` once and enqueue every matching file, bypassing the debounce.
    /// Errors for individual entries are collected and do not stop the walk.
    ///
    /// # Errors
    ///
    /// Returns an error only if the walk task itself fails.
    pub async fn scan(&self, dir: &Path) -> Result<ScanReport> {
        let root = dir.to_path_buf();
        let extensions = self.config.extensions.clone();
        let (files, errors) = tokio::task::spawn_blocking(move || walk(&root, &extensions))
            .await
            .map_err(|e| IndexError::Other(format!("scan task failed: {e}")))?;

        for e in &errors {
            tracing::warn!(dir = %dir.display(), "scan error: {e}");
        }
        let files_enqueued = files.len();
        for file in files {
            let _ = self.indexer.enqueue(file);
        }
        tracing::info!(
            dir = %dir.display(),
            files = files_enqueued,
            errors = errors.len(),
            "scan complete"
        );

        Ok(ScanReport {
            files_enqueued,
            errors,
        })
    }

    /// Stop watching and cancel pending timers; nothing is enqueued after this returns.
    pub fn close(&self) {
        let active: Vec<Active> = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for a in active {
            a.pump.abort();
        }
        self.debouncer.close();
    }
}

impl Drop for IndexWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn walk(root: &Path, extensions: &[String]) -> (Vec<PathBuf>, Vec<String>) {
    let mut files = Vec::new();
    let mut errors = Vec::new();
    for entry in ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(true)
        .build()
    {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_some_and(|ft| ft.is_file())
                    && has_extension(entry.path(), extensions)
                {
                    files.push(entry.into_path());
                }
            }
            Err(e) => errors.push(e.to_string()),
        }
    }
    (files, errors)
}

fn relevant_paths(event: &Event, roots: &[PathBuf], extensions: &[String]) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {}
        _ => return Vec::new(),
    }
    event
        .paths
        .iter()
        .filter(|p| !is_hidden(p, roots) && has_extension(p, extensions))
        .cloned()
        .collect()
}

/// Only components below the matching root count, so a root that is itself
/// inside a dot-directory still works.
fn is_hidden(path: &Path, roots: &[PathBuf]) -> bool {
    let rel = roots
        .iter()
        .find_map(|r| path.strip_prefix(r).ok())
        .unwrap_or(path);
    rel.components().any(|c| match c {
        Component::Normal(part) => part.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
}
