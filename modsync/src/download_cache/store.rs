//! The persisted download cache.
//!
//! [`DownloadCacheStore`] holds the catalog record and every cached package.
//! It is loaded once at startup, mutated only after a verified transfer, and
//! written back in full after every mutation.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::document::{self, CacheDocument};
use super::error::{CacheError, CacheResult};
use super::file::CachedFileRecord;
use super::package::CachedPackageRecord;

/// Result of [`DownloadCacheStore::load_from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No cache document exists yet. The store is unchanged.
    Missing,
    /// The document was read and replaced the in-memory state.
    Loaded {
        /// Number of cached packages read.
        packages: usize,
        /// Whether a catalog record was present.
        has_catalog: bool,
    },
}

/// Summary of a [`DownloadCacheStore::reconcile_package`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// A new package record was created.
    pub created: bool,
    /// Entries added because they were not recorded yet.
    pub entries_added: usize,
    /// Entries already recorded and left untouched.
    pub entries_kept: usize,
}

/// Root of the persisted download cache.
///
/// The store owns all records. Callers get shared references or clones and
/// never hold a mutable reference across calls.
#[derive(Debug, Clone, Default)]
pub struct DownloadCacheStore {
    catalog: Option<CachedFileRecord>,
    packages: BTreeMap<String, CachedPackageRecord>,
    dirty: bool,
}

impl DownloadCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store and load it from `path` if the file exists.
    pub fn open(path: &Path) -> CacheResult<Self> {
        let mut store = Self::new();
        store.load_from(path)?;
        Ok(store)
    }

    /// Whether the store has mutations that have not been saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// The cached mod catalog record, if any.
    pub fn catalog_record(&self) -> Option<&CachedFileRecord> {
        self.catalog.as_ref()
    }

    /// Create or update the catalog record.
    ///
    /// Fails only on an empty name, hash or tag; nothing changes on failure.
    /// A `None` tag records that the server did not send one.
    pub fn update_catalog_record(
        &mut self,
        name: &str,
        size: u64,
        hash: &str,
        tag: Option<&str>,
    ) -> CacheResult<()> {
        if tag == Some("") {
            return Err(CacheError::EmptyField { field: "cacheTag" });
        }

        let mut record = CachedFileRecord::new(name, size, hash)?;
        if let Some(tag) = tag {
            record = record.with_cache_tag(tag);
        }

        match self.catalog.as_mut() {
            Some(existing) => {
                existing.set_name(name)?;
                existing.set_size(size);
                existing.set_content_hash(hash)?;
                match tag {
                    Some(tag) => existing.set_cache_tag(tag)?,
                    None => existing.clear_cache_tag(),
                }
                existing.touch_downloaded();
            }
            None => {
                record.touch_downloaded();
                self.catalog = Some(record);
            }
        }

        self.dirty = true;
        Ok(())
    }

    /// Drop the catalog record so the next refresh is unconditional.
    pub fn clear_catalog_record(&mut self) -> bool {
        let removed = self.catalog.take().is_some();
        self.dirty |= removed;
        removed
    }

    // ------------------------------------------------------------------
    // Packages
    // ------------------------------------------------------------------

    /// Look up a cached package by archive file name.
    pub fn package(&self, name: &str) -> Option<&CachedPackageRecord> {
        self.packages.get(name)
    }

    /// Check whether a package is cached.
    pub fn has_package(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// All cached packages, ordered by name.
    pub fn list_packages(&self) -> Vec<&CachedPackageRecord> {
        self.packages.values().collect()
    }

    /// Names of all cached packages, ordered.
    pub fn package_names(&self) -> Vec<String> {
        self.packages.keys().cloned().collect()
    }

    /// Number of cached packages.
    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    /// Insert a package record if no package with its name exists.
    ///
    /// Returns `false` and leaves the store unchanged if one exists already.
    /// The record must be valid.
    pub fn create_package(&mut self, package: CachedPackageRecord) -> CacheResult<bool> {
        package.validate()?;

        if self.packages.contains_key(package.name()) {
            return Ok(false);
        }

        self.packages.insert(package.name().to_string(), package);
        self.dirty = true;
        Ok(true)
    }

    /// Replace size, hash and tag of an existing package.
    ///
    /// Returns `false` if the package is not cached. Fails on an empty hash
    /// or tag without changing anything.
    pub fn update_package_fields(
        &mut self,
        name: &str,
        size: u64,
        hash: &str,
        tag: &str,
    ) -> CacheResult<bool> {
        if hash.is_empty() {
            return Err(CacheError::EmptyField {
                field: "contentHash",
            });
        }
        if tag.is_empty() {
            return Err(CacheError::EmptyField { field: "cacheTag" });
        }

        let Some(package) = self.packages.get_mut(name) else {
            return Ok(false);
        };

        package.set_size(size);
        package.set_content_hash(hash)?;
        package.set_cache_tag(tag)?;
        package.touch_downloaded();

        self.dirty = true;
        Ok(true)
    }

    /// Add or replace one entry of an existing package.
    ///
    /// Returns the replaced entry, if any.
    pub fn put_package_entry(
        &mut self,
        package_name: &str,
        entry: CachedFileRecord,
    ) -> CacheResult<Option<CachedFileRecord>> {
        let package = self.packages.get_mut(package_name).ok_or_else(|| {
            CacheError::invalid(package_name, "package is not cached")
        })?;

        let previous = package.replace_entry(entry)?;
        self.dirty = true;
        Ok(previous)
    }

    /// Bring a package record in line with a verified download.
    ///
    /// If the package is not cached yet, a record is created holding all of
    /// `children`. Otherwise the archive fields are replaced and every child
    /// not already recorded is added. Recorded children are left as they are
    /// and children missing from `children` are not removed.
    ///
    /// All inputs are checked before anything changes.
    pub fn reconcile_package(
        &mut self,
        name: &str,
        size: u64,
        hash: &str,
        tag: &str,
        children: Vec<CachedFileRecord>,
    ) -> CacheResult<ReconcileSummary> {
        if tag.is_empty() {
            return Err(CacheError::EmptyField { field: "cacheTag" });
        }
        let mut file = CachedFileRecord::new(name, size, hash)?.with_cache_tag(tag);

        if let Some(bad) = children.iter().find(|c| !c.is_valid_in(name)) {
            return Err(CacheError::invalid(
                bad.name(),
                format!("not a valid entry of package '{}'", name),
            ));
        }

        let mut summary = ReconcileSummary::default();

        if self.has_package(name) {
            self.update_package_fields(name, size, hash, tag)?;
            for child in children {
                if self.package(name).is_some_and(|p| p.has_entry(child.name())) {
                    summary.entries_kept += 1;
                } else {
                    self.put_package_entry(name, child)?;
                    summary.entries_added += 1;
                }
            }
        } else {
            file.touch_downloaded();
            let mut package = CachedPackageRecord::new(file);
            for child in children {
                if !package.has_entry(child.name()) {
                    package.add_entry(child)?;
                    summary.entries_added += 1;
                }
            }
            summary.created = self.create_package(package)?;
        }

        debug!(
            package = name,
            created = summary.created,
            added = summary.entries_added,
            kept = summary.entries_kept,
            "Reconciled package record"
        );
        Ok(summary)
    }

    /// Remove a cached package.
    pub fn remove_package(&mut self, name: &str) -> Option<CachedPackageRecord> {
        let removed = self.packages.remove(name);
        self.dirty |= removed.is_some();
        removed
    }

    /// Remove all cached packages. The catalog record is kept.
    pub fn clear_packages(&mut self) {
        if !self.packages.is_empty() {
            self.packages.clear();
            self.dirty = true;
        }
    }

    // ------------------------------------------------------------------
    // Validity
    // ------------------------------------------------------------------

    /// Check every contained record, returning the first problem found.
    pub fn validate(&self) -> CacheResult<()> {
        if let Some(catalog) = &self.catalog {
            if !catalog.is_valid() {
                return Err(CacheError::invalid(catalog.name(), "invalid catalog record"));
            }
        }

        for (key, package) in &self.packages {
            if key != package.name() {
                return Err(CacheError::invalid(
                    package.name(),
                    format!("stored under mismatched key '{}'", key),
                ));
            }
            package.validate()?;
        }

        Ok(())
    }

    /// Whether every contained record is valid.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Replace the in-memory state with the document at `path`.
    ///
    /// A missing file is not an error. On any failure the current state is
    /// left exactly as it was.
    pub fn load_from(&mut self, path: &Path) -> CacheResult<LoadOutcome> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No download cache yet");
                return Ok(LoadOutcome::Missing);
            }
            Err(e) => {
                return Err(CacheError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let doc: CacheDocument =
            serde_json::from_str(&content).map_err(|e| CacheError::Malformed {
                path: path.to_path_buf(),
                source: e,
            })?;

        let parsed = document::parse_cache_document(doc)?;
        let outcome = LoadOutcome::Loaded {
            packages: parsed.packages.len(),
            has_catalog: parsed.catalog.is_some(),
        };

        self.catalog = parsed.catalog;
        self.packages = parsed.packages;
        self.dirty = false;

        info!(
            path = %path.display(),
            packages = self.packages.len(),
            catalog = self.catalog.is_some(),
            "Loaded download cache"
        );
        Ok(outcome)
    }

    /// Write the full current state to `path`.
    ///
    /// The document is written to a temporary sibling and renamed into place.
    /// A failed save keeps the in-memory state and the dirty flag.
    pub fn save_to(&mut self, path: &Path) -> CacheResult<()> {
        let doc = document::build_cache_document(self.catalog.as_ref(), self.packages.values());
        let content = serde_json::to_string_pretty(&doc).map_err(CacheError::Serialize)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CacheError::WriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let temp_path = temp_path_for(path);
        fs::write(&temp_path, content).map_err(|e| CacheError::WriteFailed {
            path: temp_path.clone(),
            source: e,
        })?;
        fs::rename(&temp_path, path).map_err(|e| {
            fs::remove_file(&temp_path).ok();
            CacheError::WriteFailed {
                path: path.to_path_buf(),
                source: e,
            }
        })?;

        self.dirty = false;
        debug!(
            path = %path.display(),
            packages = self.packages.len(),
            "Saved download cache"
        );
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "download_cache.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
