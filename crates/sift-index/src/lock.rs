//! The write lock shared by the indexer and any external file writer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{IndexError, Result};

/// Process-wide mutual exclusion between indexing jobs and file saves.
///
/// Clones share the same underlying mutex; construct one and hand clones to
/// every party that must be serialized.
#[derive(Debug, Clone, Default)]
pub struct WriteLock {
    inner: Arc<Mutex<()>>,
}

/// Held for the duration of a critical section; released on drop.
#[derive(Debug)]
pub struct WriteGuard {
    _guard: OwnedMutexGuard<()>,
}

impl WriteLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock without a deadline.
    pub async fn acquire(&self) -> WriteGuard {
        WriteGuard {
            _guard: Arc::clone(&self.inner).lock_owned().await,
        }
    }

    /// Wait for the lock, giving up after `timeout` when one is set.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::LockTimeout`] if the deadline passes first.
    pub async fn acquire_timeout(&self, timeout: Option<Duration>) -> Result<WriteGuard> {
        let Some(timeout) = timeout else {
            return Ok(self.acquire().await);
        };
        tokio::time::timeout(timeout, self.acquire())
            .await
            .map_err(|_| IndexError::LockTimeout(timeout))
    }

    /// Write `contents` to `path` while holding the lock, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories or the file cannot be written.
    pub async fn write_file(&self, path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
        let _guard = self.acquire().await;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        tracing::debug!(path = %path.display(), "file written under write lock");
        Ok(())
    }

    /// Whether `other` guards the same critical section.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
