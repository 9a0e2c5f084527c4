//! Repository URL normalisation and working-tree naming

use crate::error::ValidationError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Hex characters of the URL hash used as a working-tree directory name
const DIR_NAME_LEN: usize = 12;

/// Normalise a user-supplied repository reference to a clonable URL.
///
/// Accepted forms:
/// - `https://host/owner/repo[.git]` (credentials in the URL are rejected)
/// - `github.com/owner/repo`
/// - `owner/repo` (assumed to be on GitHub)
/// - `file://...` or an absolute local path, passed through unchanged
///
/// Remote URLs always end in `.git`, so `owner/repo` and
/// `https://github.com/owner/repo.git` name the same working tree.
pub fn normalize_repo_url(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Empty("repository URL".to_string()));
    }

    if trimmed.starts_with("file://") || Path::new(trimmed).is_absolute() {
        return Ok(trimmed.to_string());
    }

    let remote = if let Some(rest) = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
    {
        let authority = rest.split('/').next().unwrap_or_default();
        if authority.contains('@') {
            return Err(ValidationError::CredentialsInUrl(redact(trimmed)));
        }
        if authority.is_empty() || rest.len() <= authority.len() + 1 {
            return Err(ValidationError::InvalidRepoUrl(trimmed.to_string()));
        }
        trimmed.trim_end_matches('/').to_string()
    } else if let Some(rest) = trimmed.strip_prefix("github.com/") {
        if !is_owner_repo(rest.trim_end_matches('/')) {
            return Err(ValidationError::InvalidRepoUrl(trimmed.to_string()));
        }
        format!("https://github.com/{}", rest.trim_end_matches('/'))
    } else if is_owner_repo(trimmed) {
        format!("https://github.com/{}", trimmed)
    } else {
        return Err(ValidationError::InvalidRepoUrl(trimmed.to_string()));
    };

    if remote.ends_with(".git") {
        Ok(remote)
    } else {
        Ok(format!("{}.git", remote))
    }
}

/// Deterministic directory name for a repository's working tree
pub fn repo_dir_name(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..DIR_NAME_LEN].to_string()
}

fn is_owner_repo(s: &str) -> bool {
    let mut parts = s.split('/');
    let valid = |p: &str| {
        !p.is_empty()
            && p.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    matches!((parts.next(), parts.next(), parts.next()), (Some(owner), Some(repo), None) if valid(owner) && valid(repo))
}

fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}
