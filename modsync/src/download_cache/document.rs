//! On-disk JSON document for the download cache.
//!
//! The document has this shape:
//!
//! ```text
//! {
//!   "fileFormatVersion": "1.0.0",
//!   "modList":  { "fileName", "fileSize", "contentHash", "cacheTag"?, "downloaded"? },
//!   "packages": [
//!     { ...same fields..., "contents": [ { ...same fields... }, ... ] }
//!   ]
//! }
//! ```
//!
//! Unknown properties are logged and ignored so newer writers can add fields
//! without breaking older readers. Each record is converted individually so
//! errors can name the record that failed.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::error::{CacheError, CacheResult};
use super::file::CachedFileRecord;
use super::package::CachedPackageRecord;

/// Cache document format version written by this build.
///
/// Documents declaring any other version are rejected.
pub const FILE_FORMAT_VERSION: &str = "1.0.0";

/// Serialized form of a [`CachedFileRecord`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileRecordDocument {
    file_name: String,
    file_size: u64,
    content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    downloaded: Option<String>,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

/// Serialized form of a [`CachedPackageRecord`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PackageRecordDocument {
    file_name: String,
    file_size: u64,
    content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    downloaded: Option<String>,
    contents: Vec<Value>,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

/// Top-level cache document.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CacheDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_format_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mod_list: Option<Value>,
    packages: Vec<Value>,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

/// Records read from a cache document, ready to replace in-memory state.
#[derive(Debug, Default)]
pub(crate) struct ParsedDocument {
    pub catalog: Option<CachedFileRecord>,
    pub packages: BTreeMap<String, CachedPackageRecord>,
}

impl From<&CachedFileRecord> for FileRecordDocument {
    fn from(record: &CachedFileRecord) -> Self {
        Self {
            file_name: record.name().to_string(),
            file_size: record.size(),
            content_hash: record.content_hash().to_string(),
            cache_tag: record.cache_tag().map(str::to_string),
            downloaded: record.downloaded_at().map(format_timestamp),
            unknown: BTreeMap::new(),
        }
    }
}

impl From<&CachedPackageRecord> for PackageRecordDocument {
    fn from(package: &CachedPackageRecord) -> Self {
        Self {
            file_name: package.name().to_string(),
            file_size: package.size(),
            content_hash: package.content_hash().to_string(),
            cache_tag: package.cache_tag().map(str::to_string),
            downloaded: package.downloaded_at().map(format_timestamp),
            contents: package
                .entries()
                .map(CachedFileRecord::to_json_value)
                .collect(),
            unknown: BTreeMap::new(),
        }
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with an offset, or a naive date-time interpreted as UTC.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn warn_unknown(context: &str, unknown: &BTreeMap<String, Value>) {
    for key in unknown.keys() {
        warn!(context, property = %key, "Ignoring unknown cache property");
    }
}

fn build_file_record(
    context: &str,
    name: String,
    size: u64,
    hash: String,
    tag: Option<String>,
    downloaded: Option<String>,
) -> CacheResult<CachedFileRecord> {
    let mut record = CachedFileRecord::new(name, size, hash)
        .map_err(|e| CacheError::parse(context, e.to_string()))?;

    if let Some(tag) = tag {
        record = record.with_cache_tag(tag);
    }

    if let Some(text) = downloaded {
        let at = parse_timestamp(&text).ok_or_else(|| {
            CacheError::parse(context, format!("invalid downloaded timestamp '{}'", text))
        })?;
        record = record.with_downloaded_at(at);
    }

    Ok(record)
}

/// Parse a single file record.
pub(crate) fn parse_file_record(value: Value, context: &str) -> CacheResult<CachedFileRecord> {
    let doc: FileRecordDocument =
        serde_json::from_value(value).map_err(|e| CacheError::parse(context, e.to_string()))?;

    warn_unknown(context, &doc.unknown);

    build_file_record(
        context,
        doc.file_name,
        doc.file_size,
        doc.content_hash,
        doc.cache_tag,
        doc.downloaded,
    )
}

/// Parse a package record including its nested contents.
pub(crate) fn parse_package_record(
    value: Value,
    context: &str,
) -> CacheResult<CachedPackageRecord> {
    let doc: PackageRecordDocument =
        serde_json::from_value(value).map_err(|e| CacheError::parse(context, e.to_string()))?;

    warn_unknown(context, &doc.unknown);

    let context = format!("{} '{}'", context, doc.file_name);

    match doc.cache_tag.as_deref() {
        Some(tag) if !tag.is_empty() => {}
        _ => {
            return Err(CacheError::parse(
                &context,
                "missing or empty cacheTag on cached package",
            ))
        }
    }

    if doc.contents.is_empty() {
        return Err(CacheError::parse(&context, "contents must not be empty"));
    }

    let file = build_file_record(
        &context,
        doc.file_name,
        doc.file_size,
        doc.content_hash,
        doc.cache_tag,
        doc.downloaded,
    )?;
    let mut package = CachedPackageRecord::new(file);

    for (index, entry) in doc.contents.into_iter().enumerate() {
        let entry_context = format!("{} contents[{}]", context, index);
        let record = parse_file_record(entry, &entry_context)?;

        if package.has_entry(record.name()) {
            return Err(CacheError::DuplicateInDocument {
                collection: "contents",
                name: record.name().to_string(),
                index,
            });
        }

        package
            .add_entry(record)
            .map_err(|e| CacheError::parse(&entry_context, e.to_string()))?;
    }

    package.validate()?;
    Ok(package)
}

/// Check the declared format version against [`FILE_FORMAT_VERSION`].
///
/// Comparison is exact: pre-release and build metadata must match too.
fn check_format_version(declared: Option<&str>) -> CacheResult<()> {
    let Some(declared) = declared else {
        warn!(
            supported = FILE_FORMAT_VERSION,
            "Cache document has no fileFormatVersion, assuming current format"
        );
        return Ok(());
    };

    let found = Version::parse(declared.trim()).map_err(|e| {
        CacheError::parse(
            "fileFormatVersion",
            format!("'{}' is not a semantic version: {}", declared, e),
        )
    })?;
    let supported = Version::parse(FILE_FORMAT_VERSION).map_err(|e| {
        CacheError::parse("fileFormatVersion", format!("bad built-in version: {}", e))
    })?;

    if found != supported {
        return Err(CacheError::UnsupportedVersion {
            found: declared.to_string(),
            supported: FILE_FORMAT_VERSION.to_string(),
        });
    }

    Ok(())
}

/// Convert a deserialized document into validated records.
pub(crate) fn parse_cache_document(doc: CacheDocument) -> CacheResult<ParsedDocument> {
    check_format_version(doc.file_format_version.as_deref())?;
    warn_unknown("cache document", &doc.unknown);

    let catalog = doc
        .mod_list
        .map(|value| parse_file_record(value, "modList"))
        .transpose()?;

    let mut packages = BTreeMap::new();
    let mut seen = BTreeSet::new();

    for (index, value) in doc.packages.into_iter().enumerate() {
        let package = parse_package_record(value, &format!("packages[{}]", index))?;

        if !seen.insert(package.name().to_string()) {
            return Err(CacheError::DuplicateInDocument {
                collection: "packages",
                name: package.name().to_string(),
                index,
            });
        }

        packages.insert(package.name().to_string(), package);
    }

    Ok(ParsedDocument { catalog, packages })
}

/// Build the full document for the given records.
pub(crate) fn build_cache_document<'a>(
    catalog: Option<&CachedFileRecord>,
    packages: impl Iterator<Item = &'a CachedPackageRecord>,
) -> CacheDocument {
    CacheDocument {
        file_format_version: Some(FILE_FORMAT_VERSION.to_string()),
        mod_list: catalog.map(CachedFileRecord::to_json_value),
        packages: packages.map(CachedPackageRecord::to_json_value).collect(),
        unknown: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn document(value: Value) -> CacheDocument {
        serde_json::from_value(value).unwrap()
    }

    fn package_json(name: &str) -> Value {
        json!({
            "fileName": name,
            "fileSize": 10,
            "contentHash": "ff",
            "cacheTag": "t",
            "contents": [{ "fileName": "a.con", "fileSize": 1, "contentHash": "h1" }],
        })
    }

    #[test]
    fn test_version_must_match_exactly() {
        for version in ["2.0.0", "1.1.0", "1.0.1", "1.0.0-beta", "0.9.0"] {
            let doc = document(json!({ "fileFormatVersion": version, "packages": [] }));
            let err = parse_cache_document(doc).unwrap_err();
            assert!(
                matches!(err, CacheError::UnsupportedVersion { .. }),
                "version {} should be rejected",
                version
            );
        }
    }

    #[test]
    fn test_build_metadata_is_rejected() {
        let doc = document(json!({ "fileFormatVersion": "1.0.0+local", "packages": [] }));
        assert!(parse_cache_document(doc).is_err());
    }

    #[test]
    fn test_supported_version_accepted() {
        let doc = document(json!({ "fileFormatVersion": "1.0.0", "packages": [] }));
        let parsed = parse_cache_document(doc).unwrap();
        assert!(parsed.catalog.is_none());
        assert!(parsed.packages.is_empty());
    }

    #[test]
    fn test_missing_version_tolerated() {
        let doc = document(json!({ "packages": [package_json("mymod.zip")] }));
        let parsed = parse_cache_document(doc).unwrap();
        assert!(parsed.packages.contains_key("mymod.zip"));
    }

    #[test]
    fn test_garbage_version_is_parse_error() {
        let doc = document(json!({ "fileFormatVersion": "one", "packages": [] }));
        let err = parse_cache_document(doc).unwrap_err();
        assert!(matches!(err, CacheError::Parse { .. }));
    }

    #[test]
    fn test_duplicate_packages_rejected() {
        let doc = document(json!({
            "fileFormatVersion": "1.0.0",
            "packages": [package_json("mymod.zip"), package_json("mymod.zip")],
        }));
        let err = parse_cache_document(doc).unwrap_err();
        assert!(matches!(err, CacheError::DuplicateInDocument { index: 1, .. }));
    }

    #[test]
    fn test_packages_are_required() {
        let result: Result<CacheDocument, _> =
            serde_json::from_value(json!({ "fileFormatVersion": "1.0.0" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_top_level_property_tolerated() {
        let doc = document(json!({
            "fileFormatVersion": "1.0.0",
            "packages": [],
            "lastChecked": "2024-01-01",
        }));
        assert!(parse_cache_document(doc).is_ok());
    }

    #[test]
    fn test_error_names_failing_package() {
        let doc = document(json!({
            "fileFormatVersion": "1.0.0",
            "packages": [
                package_json("ok.zip"),
                { "fileName": "bad.zip", "fileSize": 1, "contentHash": "ff", "contents": [] },
            ],
        }));
        let err = parse_cache_document(doc).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("packages[1]"), "{}", msg);
        assert!(msg.contains("bad.zip"), "{}", msg);
    }

    #[test]
    fn test_build_document_writes_current_version() {
        let doc = build_cache_document(None, std::iter::empty());
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["fileFormatVersion"], FILE_FORMAT_VERSION);
        assert!(value.get("modList").is_none());
        assert_eq!(value["packages"], json!([]));
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2024-05-01T12:30:00Z").is_some());
        assert!(parse_timestamp("2024-05-01T12:30:00+02:00").is_some());
        assert!(parse_timestamp("2024-05-01T12:30:00.250").is_some());
        assert!(parse_timestamp("05/01/2024").is_none());
    }
}
