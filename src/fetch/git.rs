use super::RepoFetcher;
use super::lock::FsLockGuard;
use super::url::repo_dir_name;
use crate::config::FetchConfig;
use crate::error::FetchError;
use anyhow::Result;
use git2::Repository;
use git2::build::CheckoutBuilder;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Clone-or-update fetcher backed by libgit2
///
/// Each URL gets one working tree under `repos_dir`, named by the URL hash.
/// An existing tree is fast-forwarded to the remote branch; if that fails for
/// any reason the directory is discarded and cloned again once.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    repos_dir: PathBuf,
    lock_dir: PathBuf,
    lock_timeout: Duration,
}

impl GitFetcher {
    pub fn new(repos_dir: PathBuf, lock_dir: PathBuf, lock_timeout: Duration) -> Self {
        Self {
            repos_dir,
            lock_dir,
            lock_timeout,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(
            config.repos_dir.clone(),
            config.lock_dir.clone(),
            Duration::from_secs(config.lock_timeout_secs),
        )
    }

    /// Where the working tree for `url` lives (whether or not it exists yet)
    pub fn working_tree_path(&self, url: &str) -> PathBuf {
        self.repos_dir.join(repo_dir_name(url))
    }

    fn clone_or_update(&self, url: &str) -> Result<PathBuf, FetchError> {
        let path = self.working_tree_path(url);

        let _fs_lock = FsLockGuard::acquire_blocking(&self.lock_dir, url, self.lock_timeout)
            .map_err(|e| FetchError::WorkingTree(format!("{:#}", e)))?
            .ok_or_else(|| FetchError::LockTimeout(url.to_string()))?;

        if path.join(".git").exists() {
            match update(url, &path) {
                Ok(()) => {
                    tracing::info!("Updated working tree {:?} for {}", path, url);
                    return Ok(path);
                }
                Err(e) => {
                    tracing::warn!("{}; discarding working tree and re-cloning", e);
                }
            }
        }

        if path.exists() {
            std::fs::remove_dir_all(&path).map_err(|e| {
                FetchError::WorkingTree(format!("Failed to remove {:?}: {}", path, e))
            })?;
        }

        clone(url, &path)?;
        tracing::info!("Cloned {} into {:?}", url, path);
        Ok(path)
    }
}

#[async_trait::async_trait]
impl RepoFetcher for GitFetcher {
    async fn fetch(&self, repo_url: &str) -> Result<PathBuf> {
        let fetcher = self.clone();
        let url = repo_url.to_string();

        let path = tokio::task::spawn_blocking(move || fetcher.clone_or_update(&url))
            .await
            .map_err(|e| FetchError::TaskFailed(e.to_string()))??;
        Ok(path)
    }
}

fn clone(url: &str, path: &Path) -> Result<(), FetchError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            FetchError::WorkingTree(format!("Failed to create {:?}: {}", parent, e))
        })?;
    }

    Repository::clone(url, path).map(|_| ()).map_err(|e| {
        // Leave no half-written tree behind for the next attempt to trip over
        let _ = std::fs::remove_dir_all(path);
        FetchError::CloneFailed {
            url: url.to_string(),
            reason: e.message().to_string(),
        }
    })
}

/// Fetch the checked-out branch from origin and fast-forward to it
fn update(url: &str, path: &Path) -> Result<(), FetchError> {
    let failed = |e: git2::Error| FetchError::UpdateFailed {
        url: url.to_string(),
        reason: e.message().to_string(),
    };

    let repo = Repository::open(path).map_err(failed)?;
    let branch = repo
        .head()
        .map_err(failed)?
        .shorthand()
        .map(str::to_string)
        .ok_or_else(|| FetchError::UpdateFailed {
            url: url.to_string(),
            reason: "HEAD does not name a branch".to_string(),
        })?;

    let mut remote = repo.find_remote("origin").map_err(failed)?;
    remote
        .fetch(&[branch.as_str()], None, None)
        .map_err(failed)?;

    let fetch_head = repo.find_reference("FETCH_HEAD").map_err(failed)?;
    let fetch_commit = repo
        .reference_to_annotated_commit(&fetch_head)
        .map_err(failed)?;
    let (analysis, _) = repo.merge_analysis(&[&fetch_commit]).map_err(failed)?;

    if analysis.is_up_to_date() {
        tracing::debug!("{} already up to date on {}", url, branch);
    } else if analysis.is_fast_forward() {
        let refname = format!("refs/heads/{}", branch);
        let mut reference = repo.find_reference(&refname).map_err(failed)?;
        reference
            .set_target(fetch_commit.id(), "impact-ingest: fast-forward")
            .map_err(failed)?;
        repo.set_head(&refname).map_err(failed)?;
    } else {
        return Err(FetchError::UpdateFailed {
            url: url.to_string(),
            reason: format!("local branch '{}' has diverged from origin", branch),
        });
    }

    // Discard local modifications so extraction sees the fetched tree
    repo.checkout_head(Some(CheckoutBuilder::default().force()))
        .map_err(failed)?;
    Ok(())
}
