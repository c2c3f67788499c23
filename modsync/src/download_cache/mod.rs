//! Persistent download cache.
//!
//! This module records what has been downloaded and verified so later runs
//! can issue conditional requests and skip unchanged files.
//!
//! # Type Hierarchy
//!
//! ```text
//! DownloadCacheStore
//! ├── catalog: Option<CachedFileRecord>           (the mod catalog)
//! └── packages: name → CachedPackageRecord
//!                      ├── file: CachedFileRecord (the archive)  ←── contains
//!                      └── contents: name → CachedFileRecord
//! ```
//!
//! `CachedPackageRecord` uses composition plus `Deref` to extend
//! `CachedFileRecord`. Records never point back at their parent; checks that
//! need the parent take its name as an argument.
//!
//! # File Format
//!
//! The store is saved as a single JSON document carrying a
//! `fileFormatVersion`. See [`FILE_FORMAT_VERSION`].

mod document;
mod error;
mod file;
mod package;
mod store;

pub use document::FILE_FORMAT_VERSION;
pub use error::{CacheError, CacheResult};
pub use file::CachedFileRecord;
pub use package::CachedPackageRecord;
pub use store::{DownloadCacheStore, LoadOutcome, ReconcileSummary};
