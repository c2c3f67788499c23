//! Download sync engine.
//!
//! This module orchestrates a refresh:
//! 1. Send a request, conditional on the cached tag
//! 2. Stop if the server reports no change
//! 3. Verify the body against the manifest hash
//! 4. Verify every manifest file inside the archive
//! 5. Extract the archive to the destination directory
//! 6. Reconcile the cached package record
//! 7. Save the download cache
//!
//! The catalog takes the same path without steps 3 to 5 and without
//! children. Nothing in the download cache changes before step 6.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::download_cache::{CachedFileRecord, DownloadCacheStore};

use super::archive::{self, ArchiveReader};
use super::checksum;
use super::config::{SyncConfig, DEFAULT_CATALOG_FILE};
use super::error::{ErrorKind, SyncError, SyncResult};
use super::manifest::{ManifestFile, ModDownload};
use super::report::{
    FailureState, RefreshOutcome, RefreshProgressCallback, RefreshReport, RefreshStage,
    RefreshTarget,
};
use super::transport::{Request, Response, Transport};

/// A file on disk that no longer matches the download cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIssue {
    /// Entry name as recorded in the cache.
    pub entry: String,
    /// Where the file was expected.
    pub path: PathBuf,
    /// What is wrong with it.
    pub kind: FileIssueKind,
}

/// Kind of [`FileIssue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileIssueKind {
    /// The file does not exist.
    Missing,
    /// The file exists but hashes differently.
    Modified { expected: String, actual: String },
}

/// A refresh that stopped, and where.
struct Failure {
    state: FailureState,
    error: SyncError,
}

fn at<E: Into<SyncError>>(state: FailureState) -> impl FnOnce(E) -> Failure {
    move |e| Failure {
        state,
        error: e.into(),
    }
}

/// Keeps the download cache in step with the remote catalog and packages.
///
/// The store sits behind one coarse lock that is never held across an
/// `.await`. Refreshes of the same package are serialized by a per-package
/// async lock; different packages may refresh concurrently.
pub struct DownloadSyncEngine<T: Transport, A: ArchiveReader> {
    config: SyncConfig,
    transport: T,
    archives: A,
    store: Mutex<DownloadCacheStore>,
    package_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    on_progress: Option<RefreshProgressCallback>,
}

impl<T: Transport, A: ArchiveReader> DownloadSyncEngine<T, A> {
    /// Create an engine around an already loaded store.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is incomplete.
    pub fn new(
        config: SyncConfig,
        transport: T,
        archives: A,
        store: DownloadCacheStore,
    ) -> SyncResult<Self> {
        config.validate()?;

        Ok(Self {
            config,
            transport,
            archives,
            store: Mutex::new(store),
            package_locks: DashMap::new(),
            on_progress: None,
        })
    }

    /// Create an engine, loading the store from `config.cache_path`.
    ///
    /// A missing cache document yields an empty store.
    pub fn open(config: SyncConfig, transport: T, archives: A) -> SyncResult<Self> {
        config.validate()?;
        let store = DownloadCacheStore::open(&config.cache_path)?;
        Self::new(config, transport, archives, store)
    }

    /// Report stage changes to `callback`.
    pub fn with_progress(mut self, callback: RefreshProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// The engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// A copy of the current download cache.
    pub fn snapshot(&self) -> DownloadCacheStore {
        self.store.lock().clone()
    }

    /// Whether the download cache has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.store.lock().is_dirty()
    }

    /// Save the download cache to `config.cache_path`.
    pub fn save(&self) -> SyncResult<()> {
        self.store.lock().save_to(&self.config.cache_path)?;
        Ok(())
    }

    /// Consume the engine, returning the store.
    pub fn into_store(self) -> DownloadCacheStore {
        self.store.into_inner()
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// Refresh the mod catalog.
    ///
    /// The request is conditional on the cached catalog tag unless `force` is
    /// set or the local catalog copy is missing.
    pub async fn refresh_catalog(&self, force: bool) -> RefreshReport {
        let start = Instant::now();
        let target = RefreshTarget::Catalog;
        let result = self.try_refresh_catalog(&target, force).await;
        self.finish(target, start, result)
    }

    async fn try_refresh_catalog(
        &self,
        target: &RefreshTarget,
        force: bool,
    ) -> Result<(RefreshOutcome, u64), Failure> {
        let url = self
            .config
            .require_catalog_url()
            .map_err(at(FailureState::Failed))?
            .to_string();

        let have_local_copy = self.config.catalog_path.exists();
        let tag = if force || !have_local_copy {
            None
        } else {
            self.store
                .lock()
                .catalog_record()
                .and_then(|r| r.cache_tag())
                .map(str::to_string)
        };

        let response = self
            .send(target, &url, tag)
            .await
            .map_err(at(FailureState::Failed))?;
        if response.is_not_modified() {
            return Ok((RefreshOutcome::NotModified, 0));
        }

        let hash = response.content_hash();
        self.progress(target, RefreshStage::Received, &format!("{} bytes", response.len()));

        self.write_catalog(&response.body)
            .map_err(at(FailureState::Failed))?;

        let name = self
            .config
            .catalog_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_CATALOG_FILE)
            .to_string();

        self.store
            .lock()
            .update_catalog_record(&name, response.len(), &hash, response.cache_tag.as_deref())
            .map_err(at(FailureState::Failed))?;
        self.progress(target, RefreshStage::Reconciled, &name);

        let persisted = self.persist(target);
        Ok((RefreshOutcome::Updated { persisted }, response.len()))
    }

    fn write_catalog(&self, body: &[u8]) -> SyncResult<()> {
        let path = &self.config.catalog_path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SyncError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::write(path, body).map_err(|e| SyncError::WriteFailed {
            path: path.clone(),
            source: e,
        })
    }

    // ------------------------------------------------------------------
    // Packages
    // ------------------------------------------------------------------

    /// Refresh one package.
    ///
    /// `files` lists what the package must contain for the selected game
    /// version. The request is conditional on the cached package tag unless
    /// `force` is set.
    pub async fn refresh_package(
        &self,
        download: &ModDownload,
        files: &[ManifestFile],
        force: bool,
    ) -> RefreshReport {
        let start = Instant::now();
        let target = RefreshTarget::Package(download.file_name.clone());

        let lock = self.package_lock(&download.file_name);
        let guard = lock.lock().await;

        let result = self.try_refresh_package(&target, download, files, force).await;
        drop(guard);
        self.release_package_lock(&download.file_name, lock);

        self.finish(target, start, result)
    }

    /// Refresh one package for a game version.
    ///
    /// `filter` selects engine-specific files; archive containers are always
    /// kept.
    pub async fn refresh_package_for_version<F>(
        &self,
        download: &ModDownload,
        game_version: &str,
        filter: F,
        force: bool,
    ) -> RefreshReport
    where
        F: Fn(&ManifestFile) -> bool,
    {
        match download.files_for(game_version, filter) {
            Ok(files) => self.refresh_package(download, &files, force).await,
            Err(e) => self.finish(
                RefreshTarget::Package(download.file_name.clone()),
                Instant::now(),
                Err(at(FailureState::Failed)(e)),
            ),
        }
    }

    async fn try_refresh_package(
        &self,
        target: &RefreshTarget,
        download: &ModDownload,
        files: &[ManifestFile],
        force: bool,
    ) -> Result<(RefreshOutcome, u64), Failure> {
        let name = download.file_name.as_str();

        if files.is_empty() {
            return Err(at(FailureState::Failed)(SyncError::Configuration(format!(
                "manifest lists no files for {}",
                name
            ))));
        }
        if download.url.is_none() && self.config.download_base_url.is_empty() {
            return Err(at(FailureState::Failed)(SyncError::Configuration(
                "no download base URL configured".to_string(),
            )));
        }
        let url = download.resolve_url(&self.config.download_base_url);

        let tag = if force {
            None
        } else {
            self.store
                .lock()
                .package(name)
                .and_then(|p| p.cache_tag())
                .map(str::to_string)
        };

        let response = self
            .send(target, &url, tag)
            .await
            .map_err(at(FailureState::Failed))?;
        if response.is_not_modified() {
            return Ok((RefreshOutcome::NotModified, 0));
        }
        self.progress(target, RefreshStage::Received, &format!("{} bytes", response.len()));

        // Everything below is synchronous; the store is untouched until
        // every check has passed and the archive is on disk.
        self.progress(target, RefreshStage::Verifying, name);
        let hash = checksum::verify_bytes(name, &response.body, &download.sha1)
            .map_err(at(FailureState::VerificationFailed))?;

        let children = self.verify_and_extract(target, download, files, &response)?;

        let tag = match response.cache_tag.as_deref() {
            Some(tag) => tag.to_string(),
            None => {
                debug!(package = name, "No ETag in response, using content hash as tag");
                hash.clone()
            }
        };

        let summary = self
            .store
            .lock()
            .reconcile_package(name, response.len(), &hash, &tag, children)
            .map_err(at(FailureState::Failed))?;
        self.progress(
            target,
            RefreshStage::Reconciled,
            &format!("{} entries added", summary.entries_added),
        );

        let persisted = self.persist(target);
        Ok((RefreshOutcome::Updated { persisted }, response.len()))
    }

    /// Check every manifest file inside the archive, then extract it.
    ///
    /// Returns the child records to reconcile.
    fn verify_and_extract(
        &self,
        target: &RefreshTarget,
        download: &ModDownload,
        files: &[ManifestFile],
        response: &Response,
    ) -> Result<Vec<CachedFileRecord>, Failure> {
        let name = download.file_name.as_str();
        let mut archive = self
            .archives
            .open(name, response.body.clone())
            .map_err(at(FailureState::ExtractionFailed))?;

        let now = Utc::now();
        let mut children = Vec::with_capacity(files.len());

        for file in files {
            let entry = archive
                .entry(&file.file_name)
                .map_err(at(FailureState::ExtractionFailed))?
                .ok_or_else(|| SyncError::EntryMissing {
                    package: name.to_string(),
                    entry: file.file_name.clone(),
                })
                .map_err(at(FailureState::PerEntryVerificationFailed))?;

            let actual = entry.content_hash();
            if !checksum::hashes_match(&file.sha1, &actual) {
                return Err(at(FailureState::PerEntryVerificationFailed)(
                    SyncError::EntryChecksumMismatch {
                        package: name.to_string(),
                        entry: file.file_name.clone(),
                        expected: file.sha1.clone(),
                        actual,
                    },
                ));
            }

            let child = CachedFileRecord::new(file.file_name.as_str(), entry.size(), actual)
                .map_err(at(FailureState::PerEntryVerificationFailed))?
                .with_downloaded_at(now);
            children.push(child);
        }

        self.progress(
            target,
            RefreshStage::Extracting,
            &self.config.destination_dir.display().to_string(),
        );
        let written = archive
            .extract_all(&self.config.destination_dir, self.config.overwrite)
            .map_err(at(FailureState::ExtractionFailed))?;

        debug!(
            package = name,
            entries = children.len(),
            written,
            archive_bytes = archive.compressed_size(),
            "Package verified and extracted"
        );
        Ok(children)
    }

    /// Re-hash the extracted files of a cached package.
    ///
    /// Never changes the download cache.
    pub fn verify_package_files(&self, name: &str) -> SyncResult<Vec<FileIssue>> {
        let package = self
            .store
            .lock()
            .package(name)
            .cloned()
            .ok_or_else(|| SyncError::NotCached(name.to_string()))?;

        let mut issues = Vec::new();
        for entry in package.entries() {
            let dest = &self.config.destination_dir;
            let Some(path) = archive::locate_extracted(dest, entry.name()) else {
                issues.push(FileIssue {
                    entry: entry.name().to_string(),
                    path: dest.join(entry.name()),
                    kind: FileIssueKind::Missing,
                });
                continue;
            };

            let actual = checksum::file_content_hash(&path)?;
            if !entry.matches_hash(&actual) {
                issues.push(FileIssue {
                    entry: entry.name().to_string(),
                    path,
                    kind: FileIssueKind::Modified {
                        expected: entry.content_hash().to_string(),
                        actual,
                    },
                });
            }
        }

        Ok(issues)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn package_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.package_locks
            .entry(name.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Forget the lock of `name` unless another refresh is holding or
    /// waiting on it. Must be called after the guard is dropped.
    fn release_package_lock(&self, name: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        // One reference in the map, one here
        self.package_locks
            .remove_if(name, |_, held| Arc::strong_count(held) <= 2);
        drop(lock);
    }

    async fn send(
        &self,
        target: &RefreshTarget,
        url: &str,
        tag: Option<String>,
    ) -> SyncResult<Response> {
        let timeout = self.config.timeout;
        let mut request = Request::get(url).with_timeout(timeout);
        if let Some(tag) = tag {
            request = request.with_conditional_tag(tag);
        }

        let message = if request.is_conditional() {
            format!("{} (conditional)", url)
        } else {
            url.to_string()
        };
        self.progress(target, RefreshStage::RequestSent, &message);

        let response = tokio::time::timeout(timeout, self.transport.send(request))
            .await
            .map_err(|_| SyncError::Timeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            })??;

        if response.is_not_modified() || response.is_success() {
            Ok(response)
        } else {
            Err(SyncError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            })
        }
    }

    /// Save the store, logging rather than returning a failure.
    fn persist(&self, target: &RefreshTarget) -> bool {
        self.progress(target, RefreshStage::Persisting, "");
        let path = &self.config.cache_path;
        match self.store.lock().save_to(path) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    refresh = %target,
                    path = %path.display(),
                    error = %e,
                    "Failed to save download cache; in-memory cache stays updated"
                );
                false
            }
        }
    }

    fn progress(&self, target: &RefreshTarget, stage: RefreshStage, message: &str) {
        if let Some(ref cb) = self.on_progress {
            cb(target, stage, message);
        }
    }

    fn finish(
        &self,
        target: RefreshTarget,
        start: Instant,
        result: Result<(RefreshOutcome, u64), Failure>,
    ) -> RefreshReport {
        let elapsed = start.elapsed();
        let (outcome, bytes) = match result {
            Ok(done) => done,
            Err(Failure { state, error }) => {
                (RefreshOutcome::Failed { state, error }, 0)
            }
        };

        match &outcome {
            RefreshOutcome::NotModified => {
                debug!(refresh = %target, "Not modified");
            }
            RefreshOutcome::Updated { persisted } => {
                info!(
                    refresh = %target,
                    bytes,
                    persisted,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Refresh complete"
                );
            }
            RefreshOutcome::Failed { state, error } => match error.kind() {
                ErrorKind::Integrity => error!(
                    refresh = %target,
                    state = state.name(),
                    error = %error,
                    "Downloaded content is corrupt"
                ),
                kind => warn!(
                    refresh = %target,
                    state = state.name(),
                    kind = ?kind,
                    error = %error,
                    "Refresh failed"
                ),
            },
        }

        RefreshReport {
            target,
            outcome,
            bytes,
            elapsed,
        }
    }
}
