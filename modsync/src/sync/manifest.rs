//! Mod download manifests.
//!
//! A manifest says what a package archive is called, what it hashes to, and
//! which files each supported game version needs from it. The engine treats
//! it as read-only truth about what a package should contain.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{SyncError, SyncResult};

/// Kind of a file listed in a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    /// Script file.
    Con,
    /// Group archive.
    Grp,
    /// Zip archive.
    Zip,
    /// Sunstorm Interactive archive.
    Ssi,
    /// Resource file archive.
    Rff,
    /// Renamed zip archive.
    Pk3,
    /// Map.
    Map,
    /// Definition script.
    Def,
    /// Anything else.
    #[serde(other)]
    Other,
}

impl FileType {
    /// Whether this type is itself an archive the game mounts.
    ///
    /// Archive containers are kept regardless of the engine filter.
    pub fn is_archive_container(&self) -> bool {
        matches!(self, Self::Grp | Self::Zip | Self::Ssi | Self::Rff | Self::Pk3)
    }

    /// Guess the type from a file extension.
    pub fn from_file_name(name: &str) -> Self {
        let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        match ext.to_ascii_lowercase().as_str() {
            "con" => Self::Con,
            "grp" => Self::Grp,
            "zip" => Self::Zip,
            "ssi" => Self::Ssi,
            "rff" => Self::Rff,
            "pk3" => Self::Pk3,
            "map" => Self::Map,
            "def" => Self::Def,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Con => "CON",
            Self::Grp => "GRP",
            Self::Zip => "ZIP",
            Self::Ssi => "SSI",
            Self::Rff => "RFF",
            Self::Pk3 => "PK3",
            Self::Map => "MAP",
            Self::Def => "DEF",
            Self::Other => "OTHER",
        };
        write!(f, "{}", name)
    }
}

/// A file a package must contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFile {
    /// File name, matched against archive entries.
    pub file_name: String,
    /// Expected SHA-1 digest.
    pub sha1: String,
    /// File kind.
    #[serde(rename = "type")]
    pub file_type: FileType,
}

impl ManifestFile {
    /// Create a manifest file entry.
    pub fn new(file_name: impl Into<String>, sha1: impl Into<String>, file_type: FileType) -> Self {
        Self {
            file_name: file_name.into(),
            sha1: sha1.into(),
            file_type,
        }
    }
}

/// Files needed for one game version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameVersion {
    /// Game version identifier, e.g. `"atomic"`.
    pub id: String,
    /// Files in install order.
    #[serde(default)]
    pub files: Vec<ManifestFile>,
}

/// A downloadable mod package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModDownload {
    /// Archive file name, also the cache key.
    pub file_name: String,
    /// Expected SHA-1 digest of the archive.
    pub sha1: String,
    /// Explicit download URL. Derived from the base URL when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Per-game-version file lists.
    #[serde(default)]
    pub game_versions: Vec<GameVersion>,
}

impl ModDownload {
    /// Create a download with no game versions.
    pub fn new(file_name: impl Into<String>, sha1: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            sha1: sha1.into(),
            url: None,
            game_versions: Vec::new(),
        }
    }

    /// Add a game version.
    pub fn with_game_version(mut self, id: impl Into<String>, files: Vec<ManifestFile>) -> Self {
        self.game_versions.push(GameVersion {
            id: id.into(),
            files,
        });
        self
    }

    /// Set an explicit download URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Parse a manifest from JSON.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        let download: Self =
            serde_json::from_str(json).map_err(|e| SyncError::ManifestParse(e.to_string()))?;
        if download.file_name.is_empty() {
            return Err(SyncError::ManifestParse("fileName is empty".to_string()));
        }
        if download.sha1.is_empty() {
            return Err(SyncError::ManifestParse(format!(
                "sha1 of '{}' is empty",
                download.file_name
            )));
        }
        Ok(download)
    }

    /// Look up a game version by id, ignoring case.
    pub fn game_version(&self, id: &str) -> Option<&GameVersion> {
        self.game_versions
            .iter()
            .find(|v| v.id.eq_ignore_ascii_case(id))
    }

    /// The files to install for `game_version`, in manifest order.
    ///
    /// `filter` is the engine-specific file filter. Archive containers are
    /// kept even when it rejects them.
    pub fn files_for<F>(&self, game_version: &str, filter: F) -> SyncResult<Vec<ManifestFile>>
    where
        F: Fn(&ManifestFile) -> bool,
    {
        let version = self.game_version(game_version).ok_or_else(|| {
            SyncError::Configuration(format!(
                "{} has no files for game version '{}'",
                self.file_name, game_version
            ))
        })?;

        Ok(version
            .files
            .iter()
            .filter(|f| f.file_type.is_archive_container() || filter(f))
            .cloned()
            .collect())
    }

    /// The URL to fetch this package from.
    pub fn resolve_url(&self, base_url: &str) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("{}/{}", base_url.trim_end_matches('/'), self.file_name),
        }
    }
}

/// Filter accepting every file.
pub fn all_files(_: &ManifestFile) -> bool {
    true
}
