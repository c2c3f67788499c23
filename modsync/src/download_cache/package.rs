//! Cached package archive with its verified contents.
//!
//! The [`CachedPackageRecord`] extends [`CachedFileRecord`] with the set of
//! files that were extracted from the archive and verified against the
//! manifest.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use serde_json::Value;

use super::document;
use super::error::{CacheError, CacheResult};
use super::file::CachedFileRecord;

/// A downloaded package archive and the verified files it contained.
///
/// # Composition Pattern
///
/// `CachedPackageRecord` contains a `CachedFileRecord` for the archive itself
/// rather than duplicating its fields. The [`Deref`] implementation gives
/// transparent access to name, size, hash and tag.
///
/// # Example
///
/// ```
/// use modsync::download_cache::{CachedFileRecord, CachedPackageRecord};
///
/// let archive = CachedFileRecord::new("mymod.zip", 4096, "ffeedd")
///     .unwrap()
///     .with_cache_tag("\"etag-1\"");
/// let mut package = CachedPackageRecord::new(archive);
/// package
///     .add_entry(CachedFileRecord::new("a.con", 10, "h1").unwrap())
///     .unwrap();
///
/// assert_eq!(package.name(), "mymod.zip");
/// assert!(package.has_entry("a.con"));
/// assert!(package.is_valid());
/// ```
#[derive(Debug, Clone)]
pub struct CachedPackageRecord {
    /// Identity of the package archive.
    pub file: CachedFileRecord,

    contents: BTreeMap<String, CachedFileRecord>,
}

impl CachedPackageRecord {
    /// Create a package record with no entries.
    ///
    /// The record is not valid until it has a cache tag and at least one entry.
    pub fn new(file: CachedFileRecord) -> Self {
        Self {
            file,
            contents: BTreeMap::new(),
        }
    }

    /// Check whether an entry with this name is recorded.
    pub fn has_entry(&self, name: &str) -> bool {
        self.contents.contains_key(name)
    }

    /// Look up an entry by name.
    pub fn entry(&self, name: &str) -> Option<&CachedFileRecord> {
        self.contents.get(name)
    }

    /// All entries, ordered by name.
    pub fn entries(&self) -> impl Iterator<Item = &CachedFileRecord> {
        self.contents.values()
    }

    /// Number of recorded entries.
    pub fn entry_count(&self) -> usize {
        self.contents.len()
    }

    /// Add a new entry.
    ///
    /// Fails if the entry is invalid or an entry with the same name already
    /// exists. Use [`replace_entry`](Self::replace_entry) to update.
    pub fn add_entry(&mut self, entry: CachedFileRecord) -> CacheResult<()> {
        self.check_entry(&entry)?;

        if self.contents.contains_key(entry.name()) {
            return Err(CacheError::DuplicateEntry {
                package: self.file.name().to_string(),
                entry: entry.name().to_string(),
            });
        }

        self.contents.insert(entry.name().to_string(), entry);
        Ok(())
    }

    /// Add an entry, replacing any entry with the same name.
    ///
    /// Returns the previous entry if one was replaced.
    pub fn replace_entry(&mut self, entry: CachedFileRecord) -> CacheResult<Option<CachedFileRecord>> {
        self.check_entry(&entry)?;
        Ok(self.contents.insert(entry.name().to_string(), entry))
    }

    /// Remove an entry by name.
    pub fn remove_entry(&mut self, name: &str) -> Option<CachedFileRecord> {
        self.contents.remove(name)
    }

    fn check_entry(&self, entry: &CachedFileRecord) -> CacheResult<()> {
        if entry.is_valid_in(self.file.name()) {
            Ok(())
        } else {
            Err(CacheError::invalid(
                entry.name(),
                format!("not a valid entry of package '{}'", self.file.name()),
            ))
        }
    }

    /// Describe why this record is invalid, if it is.
    pub fn validate(&self) -> CacheResult<()> {
        let name = self.file.name();

        if !self.file.is_valid() {
            return Err(CacheError::invalid(name, "missing name or content hash"));
        }
        if self.file.cache_tag().is_none() {
            return Err(CacheError::invalid(name, "package has no cache tag"));
        }
        if self.contents.is_empty() {
            return Err(CacheError::invalid(name, "package has no contents"));
        }

        for (key, entry) in &self.contents {
            if key != entry.name() {
                return Err(CacheError::invalid(
                    name,
                    format!("entry key '{}' does not match entry '{}'", key, entry.name()),
                ));
            }
            if !entry.is_valid_in(name) {
                return Err(CacheError::invalid(
                    name,
                    format!("entry '{}' is invalid", entry.name()),
                ));
            }
        }

        Ok(())
    }

    /// Whether this record and all of its entries are valid.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Serialize into the on-disk record shape, with a nested `contents` array.
    pub fn to_json_value(&self) -> Value {
        serde_json::to_value(document::PackageRecordDocument::from(self)).unwrap_or(Value::Null)
    }

    /// Parse a package record from its on-disk shape.
    pub fn from_json_value(value: Value) -> CacheResult<Self> {
        document::parse_package_record(value, "package record")
    }
}

/// Deref to the archive's file record for convenient access to base fields.
impl Deref for CachedPackageRecord {
    type Target = CachedFileRecord;

    fn deref(&self) -> &Self::Target {
        &self.file
    }
}

impl DerefMut for CachedPackageRecord {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.file
    }
}

impl AsRef<CachedFileRecord> for CachedPackageRecord {
    fn as_ref(&self) -> &CachedFileRecord {
        &self.file
    }
}

impl PartialEq for CachedPackageRecord {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
    }
}

impl Eq for CachedPackageRecord {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entry(name: &str, hash: &str) -> CachedFileRecord {
        CachedFileRecord::new(name, 10, hash).unwrap()
    }

    fn package() -> CachedPackageRecord {
        let file = CachedFileRecord::new("mymod.zip", 4096, "ffeedd")
            .unwrap()
            .with_cache_tag("etag-1");
        let mut pkg = CachedPackageRecord::new(file);
        pkg.add_entry(entry("b.grp", "h2")).unwrap();
        pkg.add_entry(entry("a.con", "h1")).unwrap();
        pkg
    }

    #[test]
    fn test_entries_are_ordered_by_name() {
        let pkg = package();
        let names: Vec<_> = pkg.entries().map(|e| e.name()).collect();
        assert_eq!(names, vec!["a.con", "b.grp"]);
    }

    #[test]
    fn test_add_entry_first_writer_wins() {
        let mut pkg = package();
        let result = pkg.add_entry(entry("a.con", "other"));

        assert!(matches!(result, Err(CacheError::DuplicateEntry { .. })));
        assert_eq!(pkg.entry("a.con").unwrap().content_hash(), "h1");
    }

    #[test]
    fn test_replace_entry_overwrites() {
        let mut pkg = package();
        let previous = pkg.replace_entry(entry("a.con", "h9")).unwrap();

        assert_eq!(previous.unwrap().content_hash(), "h1");
        assert_eq!(pkg.entry("a.con").unwrap().content_hash(), "h9");
        assert_eq!(pkg.entry_count(), 2);
    }

    #[test]
    fn test_add_entry_rejects_entry_named_like_package() {
        let mut pkg = package();
        assert!(pkg.add_entry(entry("mymod.zip", "h3")).is_err());
    }

    #[test]
    fn test_validity_requires_tag_and_contents() {
        assert!(package().is_valid());

        let mut untagged = package();
        untagged.clear_cache_tag();
        assert!(!untagged.is_valid());

        let file = CachedFileRecord::new("empty.zip", 1, "h")
            .unwrap()
            .with_cache_tag("t");
        assert!(!CachedPackageRecord::new(file).is_valid());
    }

    #[test]
    fn test_deref_to_file_record() {
        let pkg = package();
        assert_eq!(pkg.name(), "mymod.zip");
        assert_eq!(pkg.size(), 4096);
        assert_eq!(pkg.cache_tag(), Some("etag-1"));
    }

    #[test]
    fn test_json_nests_contents() {
        let value = package().to_json_value();
        let contents = value["contents"].as_array().unwrap();

        assert_eq!(value["fileName"], "mymod.zip");
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["fileName"], "a.con");
    }

    #[test]
    fn test_parse_round_trip() {
        let pkg = package();
        let parsed = CachedPackageRecord::from_json_value(pkg.to_json_value()).unwrap();

        assert_eq!(parsed, pkg);
        assert_eq!(parsed.entry_count(), 2);
        assert_eq!(parsed.entry("b.grp").unwrap().content_hash(), "h2");
    }

    #[test]
    fn test_parse_rejects_empty_contents() {
        let value = json!({
            "fileName": "mymod.zip",
            "fileSize": 1,
            "contentHash": "ff",
            "cacheTag": "t",
            "contents": [],
        });
        let err = CachedPackageRecord::from_json_value(value).unwrap_err();
        assert!(err.to_string().contains("contents"));
    }

    #[test]
    fn test_parse_rejects_missing_tag() {
        let value = json!({
            "fileName": "mymod.zip",
            "fileSize": 1,
            "contentHash": "ff",
            "contents": [{ "fileName": "a.con", "fileSize": 1, "contentHash": "h1" }],
        });
        let err = CachedPackageRecord::from_json_value(value).unwrap_err();
        assert!(err.to_string().contains("cacheTag"));
    }

    #[test]
    fn test_parse_rejects_empty_tag() {
        let value = json!({
            "fileName": "mymod.zip",
            "fileSize": 1,
            "contentHash": "ff",
            "cacheTag": "",
            "contents": [{ "fileName": "a.con", "fileSize": 1, "contentHash": "h1" }],
        });
        assert!(CachedPackageRecord::from_json_value(value).is_err());
    }

    #[test]
    fn test_parse_rejects_duplicate_entries() {
        let value = json!({
            "fileName": "mymod.zip",
            "fileSize": 1,
            "contentHash": "ff",
            "cacheTag": "t",
            "contents": [
                { "fileName": "a.con", "fileSize": 1, "contentHash": "h1" },
                { "fileName": "b.grp", "fileSize": 1, "contentHash": "h2" },
                { "fileName": "a.con", "fileSize": 2, "contentHash": "h3" },
            ],
        });
        let err = CachedPackageRecord::from_json_value(value).unwrap_err();
        match err {
            CacheError::DuplicateInDocument { name, index, .. } => {
                assert_eq!(name, "a.con");
                assert_eq!(index, 2);
            }
            other => panic!("expected DuplicateInDocument, got {other:?}"),
        }
    }
}
