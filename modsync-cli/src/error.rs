//! CLI error type.

use std::fmt;
use std::io;
use std::path::PathBuf;

use modsync::config::ConfigFileError;
use modsync::download_cache::CacheError;
use modsync::sync::SyncError;

/// Errors reported by CLI commands. All map to exit code 1.
#[derive(Debug)]
pub enum CliError {
    /// Missing or invalid setting.
    Config(String),
    /// Configuration file could not be read or written.
    ConfigFile(ConfigFileError),
    /// Download cache could not be read or written.
    Cache(CacheError),
    /// Sync engine setup or operation failed.
    Sync(SyncError),
    /// One or more refreshes failed.
    RefreshFailed { failed: usize, total: usize },
    /// A package is not in the download cache.
    NotCached(String),
    /// Reading a file named on the command line failed.
    Read { path: PathBuf, source: io::Error },
    /// The async runtime could not be started.
    Runtime(io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "{}", msg),
            Self::ConfigFile(e) => write!(f, "{}", e),
            Self::Cache(e) => write!(f, "{}", e),
            Self::Sync(e) => write!(f, "{}", e),
            Self::RefreshFailed { failed, total } => {
                write!(f, "{} of {} refreshes failed", failed, total)
            }
            Self::NotCached(name) => write!(f, "'{}' is not in the download cache", name),
            Self::Read { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            Self::Runtime(e) => write!(f, "failed to start async runtime: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigFile(e) => Some(e),
            Self::Cache(e) => Some(e),
            Self::Sync(e) => Some(e),
            Self::Read { source, .. } | Self::Runtime(source) => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        Self::ConfigFile(e)
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        Self::Cache(e)
    }
}

impl From<SyncError> for CliError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Configuration(msg) => Self::Config(msg),
            SyncError::NotCached(name) => Self::NotCached(name),
            other => Self::Sync(other),
        }
    }
}
