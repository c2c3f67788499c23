//! Catalog and package synchronization.
//!
//! [`DownloadSyncEngine`] decides whether the catalog or a package must be
//! fetched again, verifies what it fetches, extracts packages and records
//! the result in the [`DownloadCacheStore`](crate::download_cache::DownloadCacheStore).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     DownloadSyncEngine                       │
//! │                                                              │
//! │   Transport ──► checksum ──► ArchiveReader ──► store         │
//! │   (reqwest)     (SHA-1)      (zip)             (JSON)        │
//! │       ▲                          ▲                           │
//! │       │                          │                           │
//! │   cache tag                 ModDownload / ManifestFile       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transport and archive access are traits so tests can substitute them.
//!
//! # Example
//!
//! ```ignore
//! use modsync::sync::{DownloadSyncEngine, ReqwestTransport, SyncConfig, ZipArchiveReader};
//!
//! let config = SyncConfig::new("/games/duke3d/mods")
//!     .with_catalog_url("https://mods.example.com/mods.json")
//!     .with_download_base_url("https://mods.example.com/files");
//! let transport = ReqwestTransport::new(config.timeout)?;
//! let engine = DownloadSyncEngine::open(config, transport, ZipArchiveReader::new())?;
//!
//! let report = engine.refresh_catalog(false).await;
//! println!("{}", report);
//! ```

mod archive;
mod checksum;
mod config;
mod engine;
mod error;
mod manifest;
mod report;
mod transport;

pub use archive::{ArchiveEntry, ArchiveHandle, ArchiveReader, ZipArchiveReader};
pub use checksum::{content_hash, file_content_hash, hashes_match};
pub use config::{SyncConfig, DEFAULT_CACHE_FILE, DEFAULT_CATALOG_FILE};
pub use engine::{DownloadSyncEngine, FileIssue, FileIssueKind};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use manifest::{all_files, FileType, GameVersion, ManifestFile, ModDownload};
pub use report::{
    FailureState, RefreshOutcome, RefreshProgressCallback, RefreshReport, RefreshStage,
    RefreshTarget,
};
pub use transport::{BoxFuture, ReqwestTransport, Request, Response, Transport, STATUS_NOT_MODIFIED};
