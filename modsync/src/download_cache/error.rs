//! Error types for the download cache.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for download cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur while mutating, loading or saving the download cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A required string field was given an empty value.
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    /// A record failed its validity check.
    #[error("invalid record '{name}': {reason}")]
    InvalidRecord { name: String, reason: String },

    /// A package already contains an entry with this name.
    #[error("package '{package}' already contains an entry named '{entry}'")]
    DuplicateEntry { package: String, entry: String },

    /// Two records in a parsed collection share a name.
    #[error("duplicate {collection} entry '{name}' at index {index}")]
    DuplicateInDocument {
        collection: &'static str,
        name: String,
        index: usize,
    },

    /// A document record could not be parsed.
    #[error("failed to parse {context}: {reason}")]
    Parse { context: String, reason: String },

    /// The document declares a format version this build cannot read.
    #[error("unsupported cache format version {found} (supported: {supported})")]
    UnsupportedVersion { found: String, supported: String },

    /// The document is not valid JSON or does not match the expected shape.
    #[error("malformed cache document {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Failed to read the cache document.
    #[error("failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write the cache document.
    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to serialize the in-memory cache.
    #[error("failed to serialize cache: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl CacheError {
    pub(crate) fn parse(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from reading a document rather than from a mutation.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::Malformed { .. }
                | Self::DuplicateInDocument { .. }
                | Self::UnsupportedVersion { .. }
                | Self::InvalidRecord { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_field_display() {
        let err = CacheError::EmptyField {
            field: "contentHash",
        };
        assert_eq!(err.to_string(), "contentHash must not be empty");
    }

    #[test]
    fn test_duplicate_in_document_names_index() {
        let err = CacheError::DuplicateInDocument {
            collection: "contents",
            name: "a.con".to_string(),
            index: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("a.con"));
        assert!(msg.contains("index 3"));
    }

    #[test]
    fn test_unsupported_version_is_parse_error() {
        let err = CacheError::UnsupportedVersion {
            found: "2.0.0".to_string(),
            supported: "1.0.0".to_string(),
        };
        assert!(err.is_parse_error());
        assert!(!CacheError::EmptyField { field: "fileName" }.is_parse_error());
    }
}
