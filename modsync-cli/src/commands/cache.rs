//! Download cache CLI commands.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use modsync::config::format_size;
use modsync::download_cache::{CachedFileRecord, DownloadCacheStore};
use modsync::sync::FileIssueKind;

use super::common::{build_engine, load_config, load_store, SyncOverrides};
use crate::error::CliError;

/// Cache subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheCommands {
    /// List the catalog and all cached packages
    List {
        /// Download cache document (default: from config)
        #[arg(long, value_name = "FILE")]
        cache_file: Option<PathBuf>,
    },

    /// Show one cached package with its files
    Show {
        /// Package file name, e.g. mymod.zip
        name: String,

        /// Download cache document (default: from config)
        #[arg(long, value_name = "FILE")]
        cache_file: Option<PathBuf>,
    },

    /// Forget a cached package so it is downloaded again
    Remove {
        /// Package file name
        name: String,

        /// Download cache document (default: from config)
        #[arg(long, value_name = "FILE")]
        cache_file: Option<PathBuf>,
    },

    /// Forget all cached packages
    Clear {
        /// Delete the whole cache document, including the catalog record
        #[arg(long)]
        all: bool,

        /// Download cache document (default: from config)
        #[arg(long, value_name = "FILE")]
        cache_file: Option<PathBuf>,
    },

    /// Re-hash extracted files against the cache
    Verify {
        /// Package file name (default: every cached package)
        name: Option<String>,

        #[command(flatten)]
        overrides: SyncOverrides,
    },
}

/// Run a cache subcommand.
pub fn run(command: CacheCommands) -> Result<(), CliError> {
    match command {
        CacheCommands::List { cache_file } => run_list(&resolve_cache_file(cache_file)),
        CacheCommands::Show { name, cache_file } => {
            run_show(&resolve_cache_file(cache_file), &name)
        }
        CacheCommands::Remove { name, cache_file } => {
            run_remove(&resolve_cache_file(cache_file), &name)
        }
        CacheCommands::Clear { all, cache_file } => run_clear(&resolve_cache_file(cache_file), all),
        CacheCommands::Verify { name, overrides } => run_verify(name.as_deref(), &overrides),
    }
}

fn resolve_cache_file(cli: Option<PathBuf>) -> PathBuf {
    cli.unwrap_or_else(|| load_config().sync.cache_file)
}

fn run_list(cache_file: &Path) -> Result<(), CliError> {
    let store = load_store(cache_file)?;

    println!("Download cache: {}", cache_file.display());
    println!();

    match store.catalog_record() {
        Some(catalog) => println!("Catalog: {}", describe(catalog)),
        None => println!("Catalog: (not downloaded)"),
    }
    println!();

    if store.package_count() == 0 {
        println!("No cached packages.");
        return Ok(());
    }

    println!("{:<32} {:>12} {:>8}  TAG", "PACKAGE", "SIZE", "FILES");
    for package in store.list_packages() {
        println!(
            "{:<32} {:>12} {:>8}  {}",
            package.name(),
            format_size(package.size()),
            package.entry_count(),
            package.cache_tag().unwrap_or("-")
        );
    }
    println!();
    println!("{} package(s)", store.package_count());

    Ok(())
}

fn run_show(cache_file: &Path, name: &str) -> Result<(), CliError> {
    let store = load_store(cache_file)?;
    let package = store
        .package(name)
        .ok_or_else(|| CliError::NotCached(name.to_string()))?;

    println!("{}", describe(package));
    println!();
    for entry in package.entries() {
        println!("  {}", describe(entry));
    }

    Ok(())
}

fn run_remove(cache_file: &Path, name: &str) -> Result<(), CliError> {
    let mut store = load_store(cache_file)?;
    if store.remove_package(name).is_none() {
        return Err(CliError::NotCached(name.to_string()));
    }
    store.save_to(cache_file)?;

    println!("Removed {} from the download cache", name);
    Ok(())
}

fn run_clear(cache_file: &Path, all: bool) -> Result<(), CliError> {
    if all {
        // Does not load the document, so an unreadable cache can be discarded
        match fs::remove_file(cache_file) {
            Ok(()) => println!("Deleted {}", cache_file.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                println!("No download cache at {}", cache_file.display())
            }
            Err(e) => {
                return Err(CliError::Read {
                    path: cache_file.to_path_buf(),
                    source: e,
                })
            }
        }
        return Ok(());
    }

    let mut store = load_store(cache_file)?;
    let count = store.package_count();
    store.clear_packages();
    store.save_to(cache_file)?;

    println!("Cleared {} package(s); catalog record kept", count);
    Ok(())
}

fn run_verify(name: Option<&str>, overrides: &SyncOverrides) -> Result<(), CliError> {
    let engine = build_engine(overrides.resolve()?)?;
    let names = match name {
        Some(name) => vec![name.to_string()],
        None => engine.snapshot().package_names(),
    };

    let mut problems = 0;
    for name in &names {
        let issues = engine.verify_package_files(name)?;
        if issues.is_empty() {
            println!("✓ {}", name);
            continue;
        }

        problems += issues.len();
        println!("✗ {}", name);
        for issue in issues {
            match issue.kind {
                FileIssueKind::Missing => println!("    missing   {}", issue.path.display()),
                FileIssueKind::Modified { .. } => {
                    println!("    modified  {}", issue.path.display())
                }
            }
        }
    }

    if problems > 0 {
        println!();
        println!("Run 'modsync sync package --force' to restore modified files.");
        return Err(CliError::Config(format!(
            "{} file(s) do not match the download cache",
            problems
        )));
    }
    Ok(())
}

fn describe(record: &CachedFileRecord) -> String {
    let downloaded = record
        .downloaded_at()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} ({}, sha1 {}, tag {}, downloaded {})",
        record.name(),
        format_size(record.size()),
        record.content_hash(),
        record.cache_tag().unwrap_or("-"),
        downloaded
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded(path: &Path) {
        let mut store = DownloadCacheStore::new();
        store
            .reconcile_package(
                "mymod.zip",
                100,
                "ffeedd",
                "etag-1",
                vec![CachedFileRecord::new("a.con", 5, "aa").unwrap()],
            )
            .unwrap();
        store
            .update_catalog_record("mods.json", 10, "abc123", Some("v1"))
            .unwrap();
        store.save_to(path).unwrap();
    }

    #[test]
    fn test_remove_package() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");
        seeded(&path);

        run_remove(&path, "mymod.zip").unwrap();
        assert!(!DownloadCacheStore::open(&path).unwrap().has_package("mymod.zip"));
        assert!(matches!(
            run_remove(&path, "mymod.zip"),
            Err(CliError::NotCached(_))
        ));
    }

    #[test]
    fn test_clear_keeps_catalog() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");
        seeded(&path);

        run_clear(&path, false).unwrap();
        let store = DownloadCacheStore::open(&path).unwrap();
        assert_eq!(store.package_count(), 0);
        assert!(store.catalog_record().is_some());

        run_clear(&path, true).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_clear_all_discards_unreadable_cache() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");
        fs::write(&path, r#"{ "fileFormatVersion": "9.0.0", "packages": [] }"#).unwrap();

        assert!(run_list(&path).is_err());
        run_clear(&path, true).unwrap();
        assert!(run_list(&path).is_ok());
    }
}
