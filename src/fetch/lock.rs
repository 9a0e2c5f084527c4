//! Locks serialising work on one repository's working tree
//!
//! Two layers:
//! 1. [`RepoLocks`] (in-process) - one async mutex per repository URL, so tasks
//!    ingesting the same URL queue up while other URLs proceed in parallel
//! 2. [`FsLockGuard`] (cross-process) - an flock() on a file named after the URL
//!    hash, held while the working tree is cloned or updated

use anyhow::{Context, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-URL in-process mutual exclusion
#[derive(Default, Clone)]
pub struct RepoLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Held for as long as the caller works on the repository
pub struct RepoLockGuard {
    _guard: OwnedMutexGuard<()>,
    url: String,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other task holds the lock for `url`, then take it
    pub async fn acquire(&self, url: &str) -> RepoLockGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries nobody else references are left over from finished runs
            locks.retain(|key, l| key == url || Arc::strong_count(l) > 1);
            locks
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        if lock.try_lock().is_err() {
            tracing::info!("Waiting for in-progress ingestion of {}", url);
        }

        let guard = lock.lock_owned().await;
        tracing::debug!("Acquired repository lock for {}", url);
        RepoLockGuard {
            _guard: guard,
            url: url.to_string(),
        }
    }

    /// Number of URLs with a live lock entry
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }
}

impl Drop for RepoLockGuard {
    fn drop(&mut self) {
        tracing::debug!("Releasing repository lock for {}", self.url);
    }
}

/// Get the lock file path for a repository URL
fn lock_file_path(lock_dir: &Path, url: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    lock_dir.join(format!("{}.lock", &hash[..16]))
}

/// Guard that holds an exclusive filesystem lock
///
/// The lock is released when this guard is dropped, or by the OS if the
/// process dies.
pub struct FsLockGuard {
    _file: File,
    path: PathBuf,
}

impl FsLockGuard {
    /// Try to acquire an exclusive filesystem lock, non-blocking
    ///
    /// Returns `Ok(None)` if another process holds the lock.
    pub fn try_acquire(lock_dir: &Path, url: &str) -> Result<Option<Self>> {
        let lock_path = lock_file_path(lock_dir, url);

        fs::create_dir_all(lock_dir).context("Failed to create lock directory")?;
        let file = File::create(&lock_path).context("Failed to create lock file")?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("Acquired filesystem lock {:?} for {}", lock_path, url);
                Ok(Some(Self {
                    _file: file,
                    path: lock_path,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) => Err(e).context("Failed to acquire filesystem lock"),
        }
    }

    /// Poll for the lock until it is acquired or `timeout` expires (`Ok(None)`)
    pub fn acquire_blocking(lock_dir: &Path, url: &str, timeout: Duration) -> Result<Option<Self>> {
        let start = Instant::now();
        let sleep_interval = Duration::from_millis(100);
        let mut announced = false;

        loop {
            if let Some(guard) = Self::try_acquire(lock_dir, url)? {
                if announced {
                    tracing::info!("Acquired filesystem lock after {:?}", start.elapsed());
                }
                return Ok(Some(guard));
            }

            if start.elapsed() >= timeout {
                tracing::warn!(
                    "Timeout waiting for filesystem lock on {} after {:?}",
                    url,
                    timeout
                );
                return Ok(None);
            }

            if !announced {
                tracing::info!(
                    "Another process is updating {}, waiting (timeout: {:?})",
                    url,
                    timeout
                );
                announced = true;
            }
            std::thread::sleep(sleep_interval);
        }
    }
}

impl Drop for FsLockGuard {
    fn drop(&mut self) {
        // The lock file itself is kept for reuse
        tracing::debug!("Releasing filesystem lock {:?}", self.path);
    }
}
