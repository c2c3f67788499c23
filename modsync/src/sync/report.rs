//! Refresh stages and outcomes.

use std::fmt;
use std::time::Duration;

use super::error::SyncError;

/// Progress callback for refresh operations.
///
/// # Arguments
///
/// * `target` - What is being refreshed
/// * `stage` - Stage just entered
/// * `message` - Human-readable message
pub type RefreshProgressCallback = Box<dyn Fn(&RefreshTarget, RefreshStage, &str) + Send + Sync>;

/// What a refresh operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefreshTarget {
    /// The mod catalog.
    Catalog,
    /// A package archive, by file name.
    Package(String),
}

impl fmt::Display for RefreshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog => write!(f, "catalog"),
            Self::Package(name) => write!(f, "package {}", name),
        }
    }
}

/// Non-terminal stages of a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStage {
    /// Request handed to the transport.
    RequestSent,
    /// A fresh body arrived.
    Received,
    /// Checking content hashes.
    Verifying,
    /// Writing archive contents to disk.
    Extracting,
    /// Cache records updated in memory.
    Reconciled,
    /// Writing the cache document.
    Persisting,
}

impl RefreshStage {
    /// Get a human-readable name for the stage.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestSent => "Requesting",
            Self::Received => "Received",
            Self::Verifying => "Verifying",
            Self::Extracting => "Extracting",
            Self::Reconciled => "Reconciled",
            Self::Persisting => "Saving",
        }
    }
}

/// Terminal failure states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureState {
    /// Bad status, transport failure or invalid setup before sending.
    Failed,
    /// Body hash does not match the manifest.
    VerificationFailed,
    /// Archive could not be opened or written out.
    ExtractionFailed,
    /// An archive entry is missing or does not match the manifest.
    PerEntryVerificationFailed,
}

impl FailureState {
    /// Get a human-readable name for the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::VerificationFailed => "verification failed",
            Self::ExtractionFailed => "extraction failed",
            Self::PerEntryVerificationFailed => "entry verification failed",
        }
    }
}

/// How a refresh ended.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The server reported no change. Nothing was touched.
    NotModified,
    /// The cache was updated.
    Updated {
        /// Whether the cache document was written. The in-memory cache is
        /// updated either way.
        persisted: bool,
    },
    /// The refresh stopped. The cache is unchanged.
    Failed {
        /// Where it stopped.
        state: FailureState,
        /// Why it stopped.
        error: SyncError,
    },
}

/// Result of one catalog or package refresh.
#[derive(Debug)]
pub struct RefreshReport {
    /// What was refreshed.
    pub target: RefreshTarget,
    /// How it ended.
    pub outcome: RefreshOutcome,
    /// Bytes received.
    pub bytes: u64,
    /// Wall time of the whole refresh.
    pub elapsed: Duration,
}

impl RefreshReport {
    /// Whether the refresh ended without error.
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, RefreshOutcome::Failed { .. })
    }

    /// Whether the cache was updated.
    pub fn is_updated(&self) -> bool {
        matches!(self.outcome, RefreshOutcome::Updated { .. })
    }

    /// Whether the server reported no change.
    pub fn is_not_modified(&self) -> bool {
        matches!(self.outcome, RefreshOutcome::NotModified)
    }

    /// The error, if the refresh failed.
    pub fn error(&self) -> Option<&SyncError> {
        match &self.outcome {
            RefreshOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// The failure state, if the refresh failed.
    pub fn failure_state(&self) -> Option<FailureState> {
        match &self.outcome {
            RefreshOutcome::Failed { state, .. } => Some(*state),
            _ => None,
        }
    }

    /// Human-readable summary.
    pub fn message(&self) -> String {
        match &self.outcome {
            RefreshOutcome::NotModified => format!("{} is up to date", self.target),
            RefreshOutcome::Updated { persisted: true } => {
                format!("{} updated ({} bytes)", self.target, self.bytes)
            }
            RefreshOutcome::Updated { persisted: false } => format!(
                "{} updated ({} bytes) but the download cache could not be saved",
                self.target, self.bytes
            ),
            RefreshOutcome::Failed { state, error } => {
                format!("{} {}: {}", self.target, state.name(), error)
            }
        }
    }
}

impl fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: RefreshOutcome) -> RefreshReport {
        RefreshReport {
            target: RefreshTarget::Package("mymod.zip".to_string()),
            outcome,
            bytes: 42,
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_not_modified_is_success() {
        let r = report(RefreshOutcome::NotModified);
        assert!(r.is_success());
        assert!(r.is_not_modified());
        assert!(!r.is_updated());
        assert_eq!(r.message(), "package mymod.zip is up to date");
    }

    #[test]
    fn test_unpersisted_update_is_success() {
        let r = report(RefreshOutcome::Updated { persisted: false });
        assert!(r.is_success());
        assert!(r.message().contains("could not be saved"));
    }

    #[test]
    fn test_failure_message_names_state_and_error() {
        let r = report(RefreshOutcome::Failed {
            state: FailureState::VerificationFailed,
            error: SyncError::ChecksumMismatch {
                filename: "mymod.zip".to_string(),
                expected: "aa".to_string(),
                actual: "bb".to_string(),
            },
        });

        assert!(!r.is_success());
        assert_eq!(r.failure_state(), Some(FailureState::VerificationFailed));
        assert!(r.error().is_some());
        let msg = r.message();
        assert!(msg.starts_with("package mymod.zip verification failed"));
        assert!(msg.contains("expected aa"));
    }

    #[test]
    fn test_target_display() {
        assert_eq!(RefreshTarget::Catalog.to_string(), "catalog");
        assert_eq!(RefreshStage::Persisting.name(), "Saving");
    }
}
