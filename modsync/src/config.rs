//! User configuration file.
//!
//! Settings live in `~/.modsync/config.ini`:
//!
//! ```ini
//! [sync]
//! catalog_url = https://mods.example.com/mods.json
//! download_base_url = https://mods.example.com/files
//! destination_dir = ~/games/duke3d/mods
//! cache_file = ~/.modsync/download_cache.json
//! catalog_file = ~/.modsync/mods.json
//! timeout_secs = 30
//!
//! [logging]
//! directory = ~/.modsync/logs
//! level = info
//! ```
//!
//! Missing keys fall back to defaults. [`ConfigKey`] gives typed access to
//! single settings for the `config get|set|list` commands.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use crate::sync::{SyncConfig, SyncError, SyncResult, DEFAULT_CACHE_FILE, DEFAULT_CATALOG_FILE};

/// Name of the per-user configuration directory.
const CONFIG_DIR_NAME: &str = ".modsync";

/// Name of the configuration file.
const CONFIG_FILE_NAME: &str = "config.ini";

/// Default HTTP timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The file exists but could not be read or parsed.
    #[error("failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    /// The file could not be written.
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A value has the wrong form.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// The key is not known.
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// The per-user configuration directory, `~/.modsync`.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Format a byte count for display.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// `[sync]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSection {
    /// URL of the mod catalog.
    pub catalog_url: String,
    /// Base URL for package downloads.
    pub download_base_url: String,
    /// Where packages are extracted. Required for syncing.
    pub destination_dir: Option<PathBuf>,
    /// Persisted download cache document.
    pub cache_file: PathBuf,
    /// Local copy of the catalog.
    pub catalog_file: PathBuf,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            catalog_url: String::new(),
            download_base_url: String::new(),
            destination_dir: None,
            cache_file: config_dir().join(DEFAULT_CACHE_FILE),
            catalog_file: config_dir().join(DEFAULT_CATALOG_FILE),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSection {
    /// Directory for rolling log files.
    pub directory: PathBuf,
    /// Default filter when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            directory: config_dir().join("logs"),
            level: "info".to_string(),
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    /// Sync settings.
    pub sync: SyncSection,
    /// Logging settings.
    pub logging: LoggingSection,
}

impl ConfigFile {
    /// Load from the default location.
    ///
    /// A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigFileError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|s| s.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }

        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating the parent directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigFileError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }

        ini.write_to_file(path).map_err(|e| ConfigFileError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Build the sync engine configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no destination directory is set.
    pub fn sync_config(&self) -> SyncResult<SyncConfig> {
        let destination = self.sync.destination_dir.clone().ok_or_else(|| {
            SyncError::Configuration(
                "no destination directory. Set sync.destination_dir or pass --dest".to_string(),
            )
        })?;

        let config = SyncConfig::new(destination)
            .with_cache_path(self.sync.cache_file.clone())
            .with_catalog_path(self.sync.catalog_file.clone())
            .with_catalog_url(self.sync.catalog_url.clone())
            .with_download_base_url(self.sync.download_base_url.clone())
            .with_timeout(Duration::from_secs(self.sync.timeout_secs));
        config.validate()?;
        Ok(config)
    }
}

/// A single configuration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    SyncCatalogUrl,
    SyncDownloadBaseUrl,
    SyncDestinationDir,
    SyncCacheFile,
    SyncCatalogFile,
    SyncTimeoutSecs,
    LoggingDirectory,
    LoggingLevel,
}

impl ConfigKey {
    /// Every key, grouped by section.
    pub fn all() -> &'static [ConfigKey] {
        &[
            Self::SyncCatalogUrl,
            Self::SyncDownloadBaseUrl,
            Self::SyncDestinationDir,
            Self::SyncCacheFile,
            Self::SyncCatalogFile,
            Self::SyncTimeoutSecs,
            Self::LoggingDirectory,
            Self::LoggingLevel,
        ]
    }

    /// INI section name.
    pub fn section(&self) -> &'static str {
        match self {
            Self::LoggingDirectory | Self::LoggingLevel => "logging",
            _ => "sync",
        }
    }

    /// Key name within the section.
    pub fn key_name(&self) -> &'static str {
        match self {
            Self::SyncCatalogUrl => "catalog_url",
            Self::SyncDownloadBaseUrl => "download_base_url",
            Self::SyncDestinationDir => "destination_dir",
            Self::SyncCacheFile => "cache_file",
            Self::SyncCatalogFile => "catalog_file",
            Self::SyncTimeoutSecs => "timeout_secs",
            Self::LoggingDirectory => "directory",
            Self::LoggingLevel => "level",
        }
    }

    /// Full name in `section.key` form.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as a string. Unset values are empty.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            Self::SyncCatalogUrl => config.sync.catalog_url.clone(),
            Self::SyncDownloadBaseUrl => config.sync.download_base_url.clone(),
            Self::SyncDestinationDir => config
                .sync
                .destination_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            Self::SyncCacheFile => config.sync.cache_file.display().to_string(),
            Self::SyncCatalogFile => config.sync.catalog_file.display().to_string(),
            Self::SyncTimeoutSecs => config.sync.timeout_secs.to_string(),
            Self::LoggingDirectory => config.logging.directory.display().to_string(),
            Self::LoggingLevel => config.logging.level.clone(),
        }
    }

    /// Set a value from its string form.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigFileError> {
        let value = value.trim();
        match self {
            Self::SyncCatalogUrl => config.sync.catalog_url = self.url(value)?,
            Self::SyncDownloadBaseUrl => config.sync.download_base_url = self.url(value)?,
            Self::SyncDestinationDir => {
                config.sync.destination_dir = if value.is_empty() {
                    None
                } else {
                    Some(expand_tilde(value))
                };
            }
            Self::SyncCacheFile => config.sync.cache_file = self.path(value)?,
            Self::SyncCatalogFile => config.sync.catalog_file = self.path(value)?,
            Self::SyncTimeoutSecs => {
                let secs: u64 = value.parse().map_err(|_| self.invalid("expected seconds"))?;
                if secs == 0 {
                    return Err(self.invalid("must be at least 1"));
                }
                config.sync.timeout_secs = secs;
            }
            Self::LoggingDirectory => config.logging.directory = self.path(value)?,
            Self::LoggingLevel => {
                if value.is_empty() {
                    return Err(self.invalid("must not be empty"));
                }
                config.logging.level = value.to_string();
            }
        }
        Ok(())
    }

    fn url(&self, value: &str) -> Result<String, ConfigFileError> {
        if !value.is_empty() && !value.starts_with("http://") && !value.starts_with("https://") {
            return Err(self.invalid("expected an http(s) URL"));
        }
        Ok(value.to_string())
    }

    fn path(&self, value: &str) -> Result<PathBuf, ConfigFileError> {
        if value.is_empty() {
            return Err(self.invalid("must not be empty"));
        }
        Ok(expand_tilde(value))
    }

    fn invalid(&self, reason: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            key: self.name(),
            reason: reason.to_string(),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigFileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigFileError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
