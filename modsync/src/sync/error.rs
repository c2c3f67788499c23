//! Error types for the sync pipeline.

use std::io;
use std::path::PathBuf;

use crate::download_cache::CacheError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Broad category of a [`SyncError`].
///
/// Callers use this to decide whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid settings. Not retried.
    Configuration,
    /// Connection failure, timeout or unexpected status. Retry later.
    Transport,
    /// Content hash mismatch. Logged as corruption.
    Integrity,
    /// Malformed cache document or manifest.
    Parse,
    /// Archive could not be opened or a required entry is absent.
    Extraction,
    /// Local disk failure.
    Io,
}

/// Errors that can occur while refreshing the catalog or a package.
#[derive(Debug)]
pub enum SyncError {
    /// Required setting missing or invalid.
    Configuration(String),

    /// Request could not be sent or the body could not be read.
    Transport { url: String, reason: String },

    /// Server answered with an unexpected status.
    HttpStatus { url: String, status: u16 },

    /// Network timeout.
    Timeout { url: String, timeout_secs: u64 },

    /// Downloaded package hash does not match the manifest.
    ChecksumMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    /// A file inside the archive does not match the manifest.
    EntryChecksumMismatch {
        package: String,
        entry: String,
        expected: String,
        actual: String,
    },

    /// The archive could not be opened.
    ArchiveOpen { package: String, reason: String },

    /// A file listed by the manifest is not in the archive.
    EntryMissing { package: String, entry: String },

    /// Archive extraction failed.
    ExtractionFailed { path: PathBuf, reason: String },

    /// Manifest JSON could not be parsed.
    ManifestParse(String),

    /// The package is not in the download cache.
    NotCached(String),

    /// Download cache rejected an operation or could not be read/written.
    Cache(CacheError),

    /// Failed to read a file or directory.
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file or directory.
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    CreateDirFailed { path: PathBuf, source: io::Error },
}

impl SyncError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::NotCached(_) => ErrorKind::Configuration,
            Self::Transport { .. } | Self::HttpStatus { .. } | Self::Timeout { .. } => {
                ErrorKind::Transport
            }
            Self::ChecksumMismatch { .. } | Self::EntryChecksumMismatch { .. } => {
                ErrorKind::Integrity
            }
            Self::ManifestParse(_) => ErrorKind::Parse,
            Self::Cache(
                CacheError::ReadFailed { .. }
                | CacheError::WriteFailed { .. }
                | CacheError::Serialize(_),
            ) => ErrorKind::Io,
            Self::Cache(_) => ErrorKind::Parse,
            Self::ArchiveOpen { .. } | Self::EntryMissing { .. } | Self::ExtractionFailed { .. } => {
                ErrorKind::Extraction
            }
            Self::ReadFailed { .. } | Self::WriteFailed { .. } | Self::CreateDirFailed { .. } => {
                ErrorKind::Io
            }
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "invalid configuration: {}", msg),
            Self::Transport { url, reason } => {
                write!(f, "failed to download {}: {}", url, reason)
            }
            Self::HttpStatus { url, status } => {
                write!(f, "request to {} failed with status {}", url, status)
            }
            Self::Timeout { url, timeout_secs } => {
                write!(f, "request to {} timed out after {}s", url, timeout_secs)
            }
            Self::ChecksumMismatch {
                filename,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "checksum mismatch for {}: expected {}, got {}",
                    filename, expected, actual
                )
            }
            Self::EntryChecksumMismatch {
                package,
                entry,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "checksum mismatch for {} in {}: expected {}, got {}",
                    entry, package, expected, actual
                )
            }
            Self::ArchiveOpen { package, reason } => {
                write!(f, "failed to open archive {}: {}", package, reason)
            }
            Self::EntryMissing { package, entry } => {
                write!(f, "archive {} does not contain {}", package, entry)
            }
            Self::ExtractionFailed { path, reason } => {
                write!(f, "failed to extract {}: {}", path.display(), reason)
            }
            Self::ManifestParse(msg) => write!(f, "failed to parse manifest: {}", msg),
            Self::NotCached(name) => write!(f, "{} is not in the download cache", name),
            Self::Cache(e) => write!(f, "download cache error: {}", e),
            Self::ReadFailed { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            Self::WriteFailed { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            Self::CreateDirFailed { path, source } => {
                write!(
                    f,
                    "failed to create directory {}: {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Cache(e) => Some(e),
            Self::ReadFailed { source, .. } => Some(source),
            Self::WriteFailed { source, .. } => Some(source),
            Self::CreateDirFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<CacheError> for SyncError {
    fn from(e: CacheError) -> Self {
        Self::Cache(e)
    }
}
