/// Centralized platform-specific path computation
///
/// Working trees and lock files live under the platform data directory, the
/// config file under the platform config directory.
use std::path::PathBuf;

const PROJECT_DIR_NAME: &str = "impact-ingest";

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Get the appropriate data directory for the current platform
    ///
    /// - Windows: %LOCALAPPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_DATA_HOME or ~/.local/share
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the appropriate config directory for the current platform
    pub fn config_dir() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Returns: {data_dir}/impact-ingest
    pub fn project_data_dir() -> PathBuf {
        Self::data_dir().join(PROJECT_DIR_NAME)
    }

    /// Returns: {config_dir}/impact-ingest
    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(PROJECT_DIR_NAME)
    }

    /// Directory holding one working tree per repository URL
    ///
    /// Returns: {data_dir}/impact-ingest/repos
    pub fn default_repos_dir() -> PathBuf {
        Self::project_data_dir().join("repos")
    }

    /// Directory holding cross-process lock files
    ///
    /// Returns: {data_dir}/impact-ingest/locks
    pub fn default_lock_dir() -> PathBuf {
        Self::project_data_dir().join("locks")
    }

    /// Returns: {config_dir}/impact-ingest/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }
}
