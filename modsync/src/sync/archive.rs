//! Package archive access.
//!
//! Packages arrive as zip archives held in memory. The engine needs two
//! things from them: individual entries for hash verification, then a full
//! extraction once every entry has verified.

use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use glob::{glob_with, MatchOptions, Pattern};
use tracing::{debug, warn};
use zip::ZipArchive;

use super::checksum;
use super::error::{SyncError, SyncResult};

/// One file read out of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path of the entry inside the archive.
    pub path: String,
    /// Uncompressed contents.
    pub data: Bytes,
}

impl ArchiveEntry {
    /// Uncompressed size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// SHA-1 digest of the contents.
    pub fn content_hash(&self) -> String {
        checksum::content_hash(&self.data)
    }
}

/// An opened archive.
pub trait ArchiveHandle: Send {
    /// Read one entry by name.
    ///
    /// Returns `Ok(None)` if the archive has no such entry.
    fn entry(&mut self, name: &str) -> SyncResult<Option<ArchiveEntry>>;

    /// Extract every entry below `dest`.
    ///
    /// Existing files are replaced only when `overwrite` is set. Returns the
    /// number of files written.
    fn extract_all(&mut self, dest: &Path, overwrite: bool) -> SyncResult<usize>;

    /// Size of the archive as downloaded.
    fn compressed_size(&self) -> u64;
}

/// Opens downloaded package bodies as archives.
pub trait ArchiveReader: Send + Sync {
    /// Open `bytes` as an archive. `label` names the package in errors.
    fn open(&self, label: &str, bytes: Bytes) -> SyncResult<Box<dyn ArchiveHandle>>;
}

/// Zip archive reader.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipArchiveReader;

impl ZipArchiveReader {
    /// Create a new zip reader.
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveReader for ZipArchiveReader {
    fn open(&self, label: &str, bytes: Bytes) -> SyncResult<Box<dyn ArchiveHandle>> {
        let size = bytes.len() as u64;
        let archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(|e| archive_error(label, e))?;

        debug!(package = label, entries = archive.len(), "Opened package archive");

        Ok(Box::new(ZipHandle {
            label: label.to_string(),
            archive,
            size,
        }))
    }
}

/// Find where the entry `name` was extracted below `dest`.
///
/// Follows the same rule as [`ArchiveHandle::entry`]: the exact path first,
/// otherwise the first file below `dest` whose name equals `name` ignoring
/// case.
pub fn locate_extracted(dest: &Path, name: &str) -> Option<PathBuf> {
    let exact = dest.join(name);
    if exact.is_file() {
        return Some(exact);
    }

    let file_name = name.rsplit('/').next().unwrap_or(name);
    let pattern = format!(
        "{}/**/{}",
        Pattern::escape(dest.to_str()?),
        Pattern::escape(file_name)
    );
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    glob_with(&pattern, options)
        .ok()?
        .filter_map(Result::ok)
        .find(|path| path.is_file())
}

fn archive_error(label: &str, reason: impl ToString) -> SyncError {
    SyncError::ArchiveOpen {
        package: label.to_string(),
        reason: reason.to_string(),
    }
}

struct ZipHandle {
    label: String,
    archive: ZipArchive<Cursor<Bytes>>,
    size: u64,
}

impl ZipHandle {
    /// Resolve `name` to an archive path.
    ///
    /// An exact path match wins; otherwise the first entry whose final path
    /// component equals `name` ignoring case.
    fn resolve(&self, name: &str) -> Option<String> {
        let mut fallback = None;
        for path in self.archive.file_names() {
            if path == name {
                return Some(path.to_string());
            }
            if fallback.is_none() && !path.ends_with('/') {
                let file_name = path.rsplit('/').next().unwrap_or(path);
                if file_name.eq_ignore_ascii_case(name) {
                    fallback = Some(path.to_string());
                }
            }
        }
        fallback
    }
}

impl ArchiveHandle for ZipHandle {
    fn entry(&mut self, name: &str) -> SyncResult<Option<ArchiveEntry>> {
        let Some(path) = self.resolve(name) else {
            return Ok(None);
        };

        let label = &self.label;
        let mut file = self
            .archive
            .by_name(&path)
            .map_err(|e| archive_error(label, e))?;

        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)
            .map_err(|e| archive_error(label, format!("failed to read {}: {}", path, e)))?;
        drop(file);

        Ok(Some(ArchiveEntry {
            path,
            data: Bytes::from(data),
        }))
    }

    fn extract_all(&mut self, dest: &Path, overwrite: bool) -> SyncResult<usize> {
        fs::create_dir_all(dest).map_err(|e| SyncError::CreateDirFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

        let mut written = 0;

        for i in 0..self.archive.len() {
            let mut file = self
                .archive
                .by_index(i)
                .map_err(|e| SyncError::ExtractionFailed {
                    path: dest.to_path_buf(),
                    reason: e.to_string(),
                })?;

            // Entries escaping the destination are skipped
            let Some(relative) = file.enclosed_name() else {
                warn!(package = %self.label, entry = file.name(), "Skipping unsafe archive path");
                continue;
            };
            let out_path = dest.join(relative);

            if file.is_dir() {
                fs::create_dir_all(&out_path).map_err(|e| SyncError::CreateDirFailed {
                    path: out_path.clone(),
                    source: e,
                })?;
                continue;
            }

            if out_path.exists() && !overwrite {
                debug!(path = %out_path.display(), "Keeping existing file");
                continue;
            }

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| SyncError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }

            let mut out = File::create(&out_path).map_err(|e| SyncError::WriteFailed {
                path: out_path.clone(),
                source: e,
            })?;
            io::copy(&mut file, &mut out).map_err(|e| SyncError::ExtractionFailed {
                path: out_path.clone(),
                reason: e.to_string(),
            })?;

            written += 1;
        }

        debug!(
            package = %self.label,
            dest = %dest.display(),
            files = written,
            "Extracted package archive"
        );
        Ok(written)
    }

    fn compressed_size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    /// Build an in-memory zip from `(path, contents)` pairs.
    pub fn build_zip(files: &[(&str, &[u8])]) -> Bytes {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for (path, contents) in files {
            writer.start_file(*path, options).unwrap();
            writer.write_all(contents).unwrap();
        }

        Bytes::from(writer.finish().unwrap().into_inner())
    }

    fn open(files: &[(&str, &[u8])]) -> Box<dyn ArchiveHandle> {
        ZipArchiveReader::new()
            .open("mymod.zip", build_zip(files))
            .unwrap()
    }

    #[test]
    fn test_open_rejects_non_zip() {
        let result = ZipArchiveReader::new().open("bad.zip", Bytes::from_static(b"not a zip"));
        match result {
            Err(SyncError::ArchiveOpen { package, .. }) => assert_eq!(package, "bad.zip"),
            _ => panic!("Expected ArchiveOpen error"),
        }
    }

    #[test]
    fn test_entry_exact_match() {
        let mut archive = open(&[("a.con", b"alpha"), ("maps/b.grp", b"bravo")]);

        let entry = archive.entry("a.con").unwrap().unwrap();
        assert_eq!(entry.path, "a.con");
        assert_eq!(entry.data.as_ref(), b"alpha");
        assert_eq!(entry.size(), 5);
        assert_eq!(entry.content_hash(), checksum::content_hash(b"alpha"));
    }

    #[test]
    fn test_entry_falls_back_to_file_name_ignoring_case() {
        let mut archive = open(&[("Maps/B.GRP", b"bravo")]);

        let entry = archive.entry("b.grp").unwrap().unwrap();
        assert_eq!(entry.path, "Maps/B.GRP");
        assert_eq!(entry.data.as_ref(), b"bravo");
    }

    #[test]
    fn test_entry_missing() {
        let mut archive = open(&[("a.con", b"alpha")]);
        assert!(archive.entry("b.grp").unwrap().is_none());
    }

    #[test]
    fn test_extract_all() {
        let temp = TempDir::new().unwrap();
        let mut archive = open(&[("a.con", b"alpha"), ("maps/b.grp", b"bravo")]);

        let written = archive.extract_all(temp.path(), true).unwrap();

        assert_eq!(written, 2);
        assert_eq!(fs::read(temp.path().join("a.con")).unwrap(), b"alpha");
        assert_eq!(fs::read(temp.path().join("maps/b.grp")).unwrap(), b"bravo");
    }

    #[test]
    fn test_locate_extracted_follows_entry_lookup() {
        let temp = TempDir::new().unwrap();
        let mut archive = open(&[("MyMod/A.CON", b"alpha"), ("b.grp", b"bravo")]);
        archive.extract_all(temp.path(), true).unwrap();

        assert_eq!(
            locate_extracted(temp.path(), "b.grp"),
            Some(temp.path().join("b.grp"))
        );
        assert_eq!(
            locate_extracted(temp.path(), "a.con"),
            Some(temp.path().join("MyMod").join("A.CON"))
        );
        assert_eq!(locate_extracted(temp.path(), "c.map"), None);
    }

    #[test]
    fn test_extract_respects_overwrite_flag() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.con"), b"old").unwrap();
        let mut archive = open(&[("a.con", b"new")]);

        assert_eq!(archive.extract_all(temp.path(), false).unwrap(), 0);
        assert_eq!(fs::read(temp.path().join("a.con")).unwrap(), b"old");

        assert_eq!(archive.extract_all(temp.path(), true).unwrap(), 1);
        assert_eq!(fs::read(temp.path().join("a.con")).unwrap(), b"new");
    }

    #[test]
    fn test_compressed_size_is_download_size() {
        let bytes = build_zip(&[("a.con", b"alpha")]);
        let len = bytes.len() as u64;
        let archive = ZipArchiveReader::new().open("p.zip", bytes).unwrap();
        assert_eq!(archive.compressed_size(), len);
    }
}
