//! Helpers shared across CLI commands.

use std::path::PathBuf;

use clap::Args;
use modsync::config::ConfigFile;
use modsync::download_cache::{CacheError, DownloadCacheStore};
use modsync::sync::{DownloadSyncEngine, ReqwestTransport, SyncConfig, ZipArchiveReader};

use crate::error::CliError;

/// Engine used by the CLI.
pub type Engine = DownloadSyncEngine<ReqwestTransport, ZipArchiveReader>;

/// Load config or return default.
pub fn load_config() -> ConfigFile {
    ConfigFile::load().unwrap_or_default()
}

/// Settings that override `config.ini` for one run.
#[derive(Debug, Clone, Default, Args)]
pub struct SyncOverrides {
    /// Directory packages are extracted into
    #[arg(long = "dest", value_name = "DIR")]
    pub destination_dir: Option<PathBuf>,

    /// Download cache document
    #[arg(long, value_name = "FILE")]
    pub cache_file: Option<PathBuf>,

    /// URL of the mod catalog
    #[arg(long, value_name = "URL")]
    pub catalog_url: Option<String>,

    /// Base URL for package downloads
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl SyncOverrides {
    /// Apply the overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut ConfigFile) {
        if let Some(dir) = &self.destination_dir {
            config.sync.destination_dir = Some(dir.clone());
        }
        if let Some(file) = &self.cache_file {
            config.sync.cache_file = file.clone();
        }
        if let Some(url) = &self.catalog_url {
            config.sync.catalog_url = url.clone();
        }
        if let Some(url) = &self.base_url {
            config.sync.download_base_url = url.clone();
        }
        if let Some(secs) = self.timeout {
            config.sync.timeout_secs = secs;
        }
    }

    /// Resolve the engine configuration.
    pub fn resolve(&self) -> Result<SyncConfig, CliError> {
        let mut config = load_config();
        self.apply(&mut config);
        Ok(config.sync_config()?)
    }
}

/// Create the engine, loading the download cache.
///
/// An unsupported cache format stops the command; the user decides whether
/// to discard the file.
pub fn build_engine(config: SyncConfig) -> Result<Engine, CliError> {
    let transport = ReqwestTransport::new(config.timeout)?;
    let cache_path = config.cache_path.clone();

    DownloadSyncEngine::open(config, transport, ZipArchiveReader::new()).map_err(|e| {
        match e {
            modsync::sync::SyncError::Cache(CacheError::UnsupportedVersion { found, supported }) => {
                CliError::Config(format!(
                    "download cache {} has format {} but this version reads {}. \
                     Run 'modsync cache clear --all' to discard it.",
                    cache_path.display(),
                    found,
                    supported
                ))
            }
            other => other.into(),
        }
    })
}

/// Load the download cache without building an engine.
pub fn load_store(cache_file: &std::path::Path) -> Result<DownloadCacheStore, CliError> {
    Ok(DownloadCacheStore::open(cache_file)?)
}
