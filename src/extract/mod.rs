//! Turning a working tree into chunk candidates
//!
//! [`FileExtractor`] emits one file-level candidate per text file. Finer-grained
//! extractors (per function, per class) plug in through [`ChunkExtractor`].

pub mod language;

pub use language::{detect_language, is_probably_text};

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::types::{ChunkCandidate, ChunkKind};
use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Component, Path};
use tokio_util::sync::CancellationToken;

/// A file the extractor looked at but could not turn into a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Everything an extraction pass produced
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    /// Sorted by path
    pub candidates: Vec<ChunkCandidate>,
    pub skipped: Vec<SkippedFile>,
}

/// Trait for walking a working tree into chunk candidates
///
/// Unreadable files are reported in [`ExtractionOutput::skipped`]; only a
/// problem with the tree as a whole is an error.
pub trait ChunkExtractor: Send + Sync {
    fn extract(&self, root: &Path, cancel: &CancellationToken) -> Result<ExtractionOutput>;
}

/// File-granular extractor
pub struct FileExtractor {
    max_chunk_chars: usize,
    max_file_size: u64,
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl FileExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let include = if config.include_patterns.is_empty() {
            None
        } else {
            Some(build_globset(&config.include_patterns)?)
        };

        Ok(Self {
            max_chunk_chars: config.max_chunk_chars,
            max_file_size: config.max_file_size,
            include,
            exclude: build_globset(&config.exclude_patterns)?,
        })
    }

    fn matches_patterns(&self, relative_path: &str) -> bool {
        if let Some(include) = &self.include
            && !include.is_match(relative_path)
        {
            return false;
        }
        !self.exclude.is_match(relative_path)
    }

    /// Read one file into a candidate; `Ok(None)` means "silently not a chunk"
    fn read_candidate(
        &self,
        path: &Path,
        relative_path: String,
    ) -> Result<Option<ChunkCandidate>, String> {
        let metadata = fs::metadata(path).map_err(|e| format!("metadata unavailable: {}", e))?;
        if metadata.len() > self.max_file_size {
            return Err(format!(
                "{} bytes exceeds the {} byte limit",
                metadata.len(),
                self.max_file_size
            ));
        }

        let bytes = fs::read(path).map_err(|e| format!("read failed: {}", e))?;
        if !is_probably_text(&bytes) {
            tracing::debug!("Skipping binary file: {}", relative_path);
            return Ok(None);
        }

        let content = String::from_utf8(bytes).map_err(|_| "not valid UTF-8".to_string())?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        let language = detect_language(path, &content);
        let symbol = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| relative_path.clone());

        Ok(Some(ChunkCandidate {
            path: relative_path,
            language,
            symbol,
            kind: ChunkKind::File,
            content: truncate_chars(&content, self.max_chunk_chars),
            summary: None,
        }))
    }
}

impl ChunkExtractor for FileExtractor {
    fn extract(&self, root: &Path, cancel: &CancellationToken) -> Result<ExtractionOutput> {
        if !root.exists() {
            return Err(ExtractionError::RootNotFound(root.display().to_string()).into());
        }
        if !root.is_dir() {
            return Err(ExtractionError::NotADirectory(root.display().to_string()).into());
        }

        let mut output = ExtractionOutput::default();

        let walker = WalkBuilder::new(root)
            .standard_filters(true)
            .hidden(false)
            .git_ignore(true)
            .git_exclude(true)
            .git_global(false)
            .require_git(false)
            .filter_entry(|entry| entry.file_name() != ".git")
            .build();

        for entry in walker {
            if cancel.is_cancelled() {
                tracing::info!(
                    "Extraction cancelled after {} files",
                    output.candidates.len()
                );
                anyhow::bail!("Extraction was cancelled");
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    output.skipped.push(SkippedFile {
                        path: String::new(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let path = entry.path();
            let Some(relative_path) = relative_slash_path(root, path) else {
                continue;
            };

            if !self.matches_patterns(&relative_path) {
                continue;
            }

            match self.read_candidate(path, relative_path.clone()) {
                Ok(Some(candidate)) => output.candidates.push(candidate),
                Ok(None) => {}
                Err(reason) => {
                    tracing::warn!("Skipping {}: {}", relative_path, reason);
                    output.skipped.push(SkippedFile {
                        path: relative_path,
                        reason,
                    });
                }
            }
        }

        output.candidates.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!(
            "Extracted {} chunk candidates from {:?} ({} skipped)",
            output.candidates.len(),
            root,
            output.skipped.len()
        );
        Ok(output)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ExtractionError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ExtractionError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ExtractionError::InvalidPattern {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })
}

/// `path` relative to `root`, joined with `/` regardless of platform
fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Truncate to at most `max_chars` characters on a char boundary
pub fn truncate_chars(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => content[..byte_idx].to_string(),
        None => content.to_string(),
    }
}
