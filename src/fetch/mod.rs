//! Repository fetching: clone-or-update of public repositories into
//! deterministically named working trees.

mod git;
mod lock;
mod url;

pub use git::GitFetcher;
pub use lock::{FsLockGuard, RepoLockGuard, RepoLocks};
pub use url::{normalize_repo_url, repo_dir_name};

use anyhow::Result;
use std::path::PathBuf;

/// Trait for making a repository available on local disk
///
/// `fetch` must be idempotent: calling it again for the same URL updates the
/// existing working tree rather than creating another one.
#[async_trait::async_trait]
pub trait RepoFetcher: Send + Sync {
    /// Clone or update `repo_url` and return the working-tree path
    async fn fetch(&self, repo_url: &str) -> Result<PathBuf>;
}

/// Fetcher for trees that already exist on disk; returns the URL as a path
#[derive(Debug, Default, Clone)]
pub struct LocalPathFetcher;

#[async_trait::async_trait]
impl RepoFetcher for LocalPathFetcher {
    async fn fetch(&self, repo_url: &str) -> Result<PathBuf> {
        let path = PathBuf::from(repo_url.strip_prefix("file://").unwrap_or(repo_url));
        if !path.is_dir() {
            anyhow::bail!("Local repository path does not exist: {}", path.display());
        }
        Ok(path)
    }
}
