//! Watching, AST chunking and serialized indexing of source files.
//!
//! Filesystem events are debounced per path by [`IndexWatcher`], queued on a
//! single-worker [`Indexer`] that holds the shared [`WriteLock`] for each job,
//! split into declaration chunks by [`chunk`], and written to a
//! [`sift_store::VectorStore`] after the file's previous entries are removed.

pub mod chunker;
pub mod error;
pub mod indexer;
pub mod languages;
pub mod lock;
pub mod watcher;

pub use chunker::{Chunk, chunk};
pub use error::{IndexError, Result};
pub use indexer::{IndexReport, IndexTicket, Indexer, IndexerConfig, JobOutcome, entry_id};
pub use languages::Grammar;
pub use lock::{WriteGuard, WriteLock};
pub use watcher::{DEFAULT_DEBOUNCE, Debouncer, IndexWatcher, ScanReport, WatcherConfig};
