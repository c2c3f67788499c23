//! Sync CLI commands.
//!
//! `sync catalog` refreshes the mod catalog; `sync package` refreshes one or
//! more packages described by manifest files. Packages are refreshed
//! concurrently.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Subcommand;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use modsync::sync::{ManifestFile, ModDownload, RefreshReport, RefreshStage, RefreshTarget};

use super::common::{build_engine, SyncOverrides};
use crate::error::CliError;

/// Sync subcommands.
#[derive(Debug, Subcommand)]
pub enum SyncCommands {
    /// Refresh the mod catalog
    Catalog {
        /// Ignore the cached tag and download unconditionally
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        overrides: SyncOverrides,
    },

    /// Download, verify and extract packages
    Package {
        /// Manifest JSON files, one per package
        #[arg(required = true, value_name = "MANIFEST")]
        manifests: Vec<PathBuf>,

        /// Game version to install files for (default: first in manifest)
        #[arg(long, short = 'g')]
        game_version: Option<String>,

        /// Only install archive containers (GRP, ZIP, SSI, RFF, PK3)
        #[arg(long)]
        archives_only: bool,

        /// Ignore cached tags and download unconditionally
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        overrides: SyncOverrides,
    },
}

/// Run a sync subcommand.
pub fn run(command: SyncCommands) -> Result<(), CliError> {
    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;

    match command {
        SyncCommands::Catalog { force, overrides } => runtime.block_on(run_catalog(force, overrides)),
        SyncCommands::Package {
            manifests,
            game_version,
            archives_only,
            force,
            overrides,
        } => runtime.block_on(run_packages(
            &manifests,
            game_version.as_deref(),
            archives_only,
            force,
            overrides,
        )),
    }
}

async fn run_catalog(force: bool, overrides: SyncOverrides) -> Result<(), CliError> {
    let spinner = spinner();
    let engine = build_engine(overrides.resolve()?)?.with_progress(progress_reporter(&spinner));

    let report = engine.refresh_catalog(force).await;
    spinner.finish_and_clear();

    print_report(&report);
    summarize(&[report])
}

async fn run_packages(
    manifests: &[PathBuf],
    game_version: Option<&str>,
    archives_only: bool,
    force: bool,
    overrides: SyncOverrides,
) -> Result<(), CliError> {
    let mut jobs = Vec::with_capacity(manifests.len());
    for path in manifests {
        let download = load_manifest(path)?;
        let version = match game_version {
            Some(v) => v.to_string(),
            None => download
                .game_versions
                .first()
                .map(|v| v.id.clone())
                .ok_or_else(|| {
                    CliError::Config(format!("{} lists no game versions", path.display()))
                })?,
        };
        jobs.push((download, version));
    }

    let spinner = spinner();
    let engine = build_engine(overrides.resolve()?)?.with_progress(progress_reporter(&spinner));

    let filter = move |file: &ManifestFile| !archives_only || file.file_type.is_archive_container();
    let reports = join_all(jobs.iter().map(|(download, version)| {
        engine.refresh_package_for_version(download, version, filter, force)
    }))
    .await;
    spinner.finish_and_clear();

    for report in &reports {
        print_report(report);
    }
    summarize(&reports)
}

fn load_manifest(path: &Path) -> Result<ModDownload, CliError> {
    let json = fs::read_to_string(path).map_err(|e| CliError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(ModDownload::from_json(&json)?)
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn progress_reporter(
    pb: &ProgressBar,
) -> Box<dyn Fn(&RefreshTarget, RefreshStage, &str) + Send + Sync> {
    let pb = pb.clone();
    Box::new(move |target: &RefreshTarget, stage: RefreshStage, message: &str| {
        if message.is_empty() {
            pb.set_message(format!("{}: {}", target, stage.name()));
        } else {
            pb.set_message(format!("{}: {} {}", target, stage.name(), message));
        }
    })
}

fn print_report(report: &RefreshReport) {
    let mark = if report.is_success() { "✓" } else { "✗" };
    println!(
        "{} {} ({:.1}s)",
        mark,
        report.message(),
        report.elapsed.as_secs_f64()
    );
}

fn summarize(reports: &[RefreshReport]) -> Result<(), CliError> {
    let failed = reports.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        return Err(CliError::RefreshFailed {
            failed,
            total: reports.len(),
        });
    }
    Ok(())
}
