//! Configuration for the sync engine.

use std::path::PathBuf;
use std::time::Duration;

use super::error::{SyncError, SyncResult};

/// Default file name of the cache document.
pub const DEFAULT_CACHE_FILE: &str = "download_cache.json";

/// Default file name of the local catalog copy.
pub const DEFAULT_CATALOG_FILE: &str = "mods.json";

/// Configuration for the [`DownloadSyncEngine`](super::DownloadSyncEngine).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory packages are extracted into.
    ///
    /// Typically the game's mod folder. Required.
    pub destination_dir: PathBuf,

    /// Path of the persisted cache document.
    pub cache_path: PathBuf,

    /// Where the downloaded catalog body is written.
    pub catalog_path: PathBuf,

    /// URL of the mod catalog.
    pub catalog_url: String,

    /// Base URL package file names are appended to.
    pub download_base_url: String,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Whether extraction replaces existing files.
    pub overwrite: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            destination_dir: PathBuf::new(),
            cache_path: PathBuf::from(DEFAULT_CACHE_FILE),
            catalog_path: PathBuf::from(DEFAULT_CATALOG_FILE),
            catalog_url: String::new(),
            download_base_url: String::new(),
            timeout: Duration::from_secs(30),
            overwrite: true,
        }
    }
}

impl SyncConfig {
    /// Create a configuration extracting into `destination_dir`.
    pub fn new(destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            destination_dir: destination_dir.into(),
            ..Default::default()
        }
    }

    /// Set the cache document path.
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    /// Set the local catalog path.
    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = path.into();
        self
    }

    /// Set the catalog URL.
    pub fn with_catalog_url(mut self, url: impl Into<String>) -> Self {
        self.catalog_url = url.into();
        self
    }

    /// Set the package download base URL.
    pub fn with_download_base_url(mut self, url: impl Into<String>) -> Self {
        self.download_base_url = url.into();
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable overwriting existing files on extraction.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Check the settings every refresh needs.
    pub fn validate(&self) -> SyncResult<()> {
        if self.destination_dir.as_os_str().is_empty() {
            return Err(SyncError::Configuration(
                "no destination directory configured".to_string(),
            ));
        }
        if self.cache_path.as_os_str().is_empty() {
            return Err(SyncError::Configuration(
                "no cache file configured".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(SyncError::Configuration("timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// The catalog URL, or an error if none is set.
    pub fn require_catalog_url(&self) -> SyncResult<&str> {
        if self.catalog_url.is_empty() {
            return Err(SyncError::Configuration("no catalog URL configured".to_string()));
        }
        Ok(&self.catalog_url)
    }
}
