//! Verified identity of one tracked file.
//!
//! The [`CachedFileRecord`] is the leaf value of the download cache. It is
//! used directly for the mod catalog and as the child entries of a
//! [`CachedPackageRecord`](super::CachedPackageRecord).

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::document::{self, FileRecordDocument};
use super::error::{CacheError, CacheResult};

/// A file whose content hash has been verified at least once.
///
/// Two records are equal when their names are equal. A re-download that
/// changes size or hash therefore replaces the existing record instead of
/// sitting beside it.
///
/// # Example
///
/// ```
/// use modsync::download_cache::CachedFileRecord;
///
/// let record = CachedFileRecord::new("mods.json", 1024, "abc123")
///     .unwrap()
///     .with_cache_tag("\"v1\"");
///
/// assert_eq!(record.name(), "mods.json");
/// assert_eq!(record.cache_tag(), Some("\"v1\""));
/// assert!(record.is_valid());
/// ```
#[derive(Debug, Clone)]
pub struct CachedFileRecord {
    name: String,
    size: u64,
    content_hash: String,
    cache_tag: Option<String>,
    downloaded_at: Option<DateTime<Utc>>,
}

impl CachedFileRecord {
    /// Create a record with the required identity fields.
    ///
    /// Fails if `name` or `content_hash` is empty.
    pub fn new(
        name: impl Into<String>,
        size: u64,
        content_hash: impl Into<String>,
    ) -> CacheResult<Self> {
        let name = name.into();
        let content_hash = content_hash.into();

        if name.is_empty() {
            return Err(CacheError::EmptyField { field: "fileName" });
        }
        if content_hash.is_empty() {
            return Err(CacheError::EmptyField {
                field: "contentHash",
            });
        }

        Ok(Self {
            name,
            size,
            content_hash,
            cache_tag: None,
            downloaded_at: None,
        })
    }

    /// Set the transport cache tag (builder pattern).
    ///
    /// An empty tag means "not yet known" and is stored as `None`.
    pub fn with_cache_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        self.cache_tag = (!tag.is_empty()).then_some(tag);
        self
    }

    /// Set the last successful download time (builder pattern).
    pub fn with_downloaded_at(mut self, at: DateTime<Utc>) -> Self {
        self.downloaded_at = Some(at);
        self
    }

    /// File name, unique within its container.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes. Informational only.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Hex-encoded content digest.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Transport cache tag (HTTP ETag), if one is known.
    pub fn cache_tag(&self) -> Option<&str> {
        self.cache_tag.as_deref()
    }

    /// When this file was last downloaded successfully.
    pub fn downloaded_at(&self) -> Option<DateTime<Utc>> {
        self.downloaded_at
    }

    /// Rename the record. Rejects an empty name and leaves state unchanged.
    pub fn set_name(&mut self, name: impl Into<String>) -> CacheResult<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(CacheError::EmptyField { field: "fileName" });
        }
        self.name = name;
        Ok(())
    }

    /// Set the size in bytes.
    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    /// Replace the content hash. Rejects an empty hash and leaves state unchanged.
    pub fn set_content_hash(&mut self, hash: impl Into<String>) -> CacheResult<()> {
        let hash = hash.into();
        if hash.is_empty() {
            return Err(CacheError::EmptyField {
                field: "contentHash",
            });
        }
        self.content_hash = hash;
        Ok(())
    }

    /// Replace the cache tag. Rejects an empty tag and leaves state unchanged.
    pub fn set_cache_tag(&mut self, tag: impl Into<String>) -> CacheResult<()> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(CacheError::EmptyField { field: "cacheTag" });
        }
        self.cache_tag = Some(tag);
        Ok(())
    }

    /// Forget the cache tag so the next request is unconditional.
    pub fn clear_cache_tag(&mut self) {
        self.cache_tag = None;
    }

    /// Set the download timestamp.
    pub fn set_downloaded_at(&mut self, at: DateTime<Utc>) {
        self.downloaded_at = Some(at);
    }

    /// Stamp the record as downloaded now.
    pub fn touch_downloaded(&mut self) {
        self.downloaded_at = Some(Utc::now());
    }

    /// Clear the download timestamp.
    pub fn clear_downloaded_at(&mut self) {
        self.downloaded_at = None;
    }

    /// Compare a hex digest against this record's hash, ignoring case.
    pub fn matches_hash(&self, hash: &str) -> bool {
        self.content_hash.eq_ignore_ascii_case(hash)
    }

    /// A record is valid when it has a name and a content hash.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.content_hash.is_empty()
    }

    /// Validity of a record stored as a child of the package `parent`.
    ///
    /// A child may not carry the name of the package archive it came from.
    pub fn is_valid_in(&self, parent: &str) -> bool {
        self.is_valid() && self.name != parent
    }

    /// Serialize into the on-disk record shape.
    pub fn to_json_value(&self) -> Value {
        // A record built through the constructors always serializes.
        serde_json::to_value(FileRecordDocument::from(self)).unwrap_or(Value::Null)
    }

    /// Parse a record from its on-disk shape.
    ///
    /// Fails with a descriptive error on a missing or mistyped required
    /// field, a negative or fractional `fileSize`, or a bad timestamp.
    pub fn from_json_value(value: Value) -> CacheResult<Self> {
        document::parse_file_record(value, "file record")
    }
}

impl PartialEq for CachedFileRecord {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for CachedFileRecord {}

impl Hash for CachedFileRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for CachedFileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes, {})", self.name, self.size, self.content_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn record() -> CachedFileRecord {
        CachedFileRecord::new("mods.json", 2048, "abc123").unwrap()
    }

    #[test]
    fn test_new_rejects_empty_fields() {
        assert!(CachedFileRecord::new("", 1, "abc").is_err());
        assert!(CachedFileRecord::new("a.con", 1, "").is_err());
        assert!(CachedFileRecord::new("a.con", 0, "abc").is_ok());
    }

    #[test]
    fn test_empty_tag_means_unknown() {
        let rec = record().with_cache_tag("");
        assert_eq!(rec.cache_tag(), None);
    }

    #[test]
    fn test_mutators_reject_empty_and_keep_state() {
        let mut rec = record().with_cache_tag("v1");

        assert!(rec.set_name("").is_err());
        assert!(rec.set_content_hash("").is_err());
        assert!(rec.set_cache_tag("").is_err());

        assert_eq!(rec.name(), "mods.json");
        assert_eq!(rec.content_hash(), "abc123");
        assert_eq!(rec.cache_tag(), Some("v1"));
    }

    #[test]
    fn test_mutators_apply_values() {
        let mut rec = record();
        rec.set_name("catalog.json").unwrap();
        rec.set_content_hash("def456").unwrap();
        rec.set_cache_tag("v2").unwrap();
        rec.set_size(10);

        assert_eq!(rec.name(), "catalog.json");
        assert_eq!(rec.content_hash(), "def456");
        assert_eq!(rec.cache_tag(), Some("v2"));
        assert_eq!(rec.size(), 10);
    }

    #[test]
    fn test_clear_downloaded_at() {
        let mut rec = record();
        rec.touch_downloaded();
        assert!(rec.downloaded_at().is_some());

        rec.clear_downloaded_at();
        assert!(rec.downloaded_at().is_none());

        // Clearing twice is fine
        rec.clear_downloaded_at();
        assert!(rec.downloaded_at().is_none());
    }

    #[test]
    fn test_equality_by_name_only() {
        let a = CachedFileRecord::new("a.con", 1, "h1").unwrap();
        let b = CachedFileRecord::new("a.con", 999, "h2")
            .unwrap()
            .with_cache_tag("t");
        let c = CachedFileRecord::new("b.con", 1, "h1").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_matches_hash_ignores_case() {
        let rec = CachedFileRecord::new("a.con", 1, "ABCDEF").unwrap();
        assert!(rec.matches_hash("abcdef"));
        assert!(!rec.matches_hash("abcde0"));
    }

    #[test]
    fn test_is_valid_in_parent() {
        let rec = CachedFileRecord::new("a.con", 1, "h1").unwrap();
        assert!(rec.is_valid_in("mymod.zip"));
        assert!(!rec.is_valid_in("a.con"));
    }

    #[test]
    fn test_json_shape() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let rec = record().with_cache_tag("v1").with_downloaded_at(at);
        let value = rec.to_json_value();

        assert_eq!(value["fileName"], "mods.json");
        assert_eq!(value["fileSize"], 2048);
        assert_eq!(value["contentHash"], "abc123");
        assert_eq!(value["cacheTag"], "v1");
        assert_eq!(value["downloaded"], "2024-05-01T12:30:00Z");
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let value = record().to_json_value();
        assert!(value.get("cacheTag").is_none());
        assert!(value.get("downloaded").is_none());
    }

    #[test]
    fn test_parse_rejects_negative_size() {
        let value = serde_json::json!({
            "fileName": "a.con",
            "fileSize": -1,
            "contentHash": "abc",
        });
        assert!(CachedFileRecord::from_json_value(value).is_err());
    }

    #[test]
    fn test_parse_rejects_fractional_size() {
        let value = serde_json::json!({
            "fileName": "a.con",
            "fileSize": 1.5,
            "contentHash": "abc",
        });
        assert!(CachedFileRecord::from_json_value(value).is_err());
    }

    #[test]
    fn test_parse_rejects_missing_and_mistyped_fields() {
        let missing = serde_json::json!({ "fileName": "a.con", "fileSize": 1 });
        let err = CachedFileRecord::from_json_value(missing).unwrap_err();
        assert!(err.to_string().contains("contentHash"));

        let mistyped = serde_json::json!({
            "fileName": 42,
            "fileSize": 1,
            "contentHash": "abc",
        });
        assert!(CachedFileRecord::from_json_value(mistyped).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_timestamp() {
        let value = serde_json::json!({
            "fileName": "a.con",
            "fileSize": 1,
            "contentHash": "abc",
            "downloaded": "yesterday",
        });
        let err = CachedFileRecord::from_json_value(value).unwrap_err();
        assert!(err.to_string().contains("downloaded"));
    }

    #[test]
    fn test_parse_tolerates_unknown_properties() {
        let value = serde_json::json!({
            "fileName": "a.con",
            "fileSize": 1,
            "contentHash": "abc",
            "mirror": "https://example.com",
        });
        let rec = CachedFileRecord::from_json_value(value).unwrap();
        assert_eq!(rec.name(), "a.con");
    }

    #[test]
    fn test_parse_accepts_timestamp_without_offset() {
        let value = serde_json::json!({
            "fileName": "a.con",
            "fileSize": 1,
            "contentHash": "abc",
            "downloaded": "2024-05-01T12:30:00",
        });
        let rec = CachedFileRecord::from_json_value(value).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(rec.downloaded_at(), Some(expected));
    }

    proptest! {
        #[test]
        fn prop_round_trip_preserves_fields(
            name in "[a-zA-Z0-9_.]{1,24}",
            size in any::<u64>(),
            hash in "[0-9a-f]{40}",
            tag in proptest::option::of("[a-zA-Z0-9\"-]{1,16}"),
            secs in proptest::option::of(0i64..4_000_000_000),
            nanos in 0u32..1_000_000_000,
        ) {
            let mut rec = CachedFileRecord::new(name, size, hash).unwrap();
            if let Some(tag) = tag {
                rec = rec.with_cache_tag(tag);
            }
            if let Some(secs) = secs {
                rec = rec.with_downloaded_at(Utc.timestamp_opt(secs, nanos).unwrap());
            }

            let parsed = CachedFileRecord::from_json_value(rec.to_json_value()).unwrap();

            prop_assert_eq!(&parsed, &rec);
            prop_assert_eq!(parsed.size(), rec.size());
            prop_assert_eq!(parsed.content_hash(), rec.content_hash());
            prop_assert_eq!(parsed.cache_tag(), rec.cache_tag());
            prop_assert_eq!(parsed.downloaded_at(), rec.downloaded_at());
        }
    }
}
