//! CLI command implementations
//!
//! This module contains all adp CLI command implementations.

pub mod config;
pub mod graph;
pub mod scan;
pub mod schema;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use adp_config::{AdpConfig, ConfigLoader, ConfigOverrides};
use adp_core::{CancellationToken, ScanReport, Scanner};
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use crate::GlobalOptions;

/// What to scan, shared by every graph command.
#[derive(Args, Debug, Clone)]
pub struct ScanTarget {
    /// File or directory to scan
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Report undeclared fields and treat warnings as failures
    #[arg(long)]
    pub strict: bool,

    /// Glob patterns to exclude (repeatable)
    #[arg(long = "exclude", short = 'e')]
    pub exclude: Vec<String>,
}

/// Directory whose `.adp/config.toml` applies to a scan root.
pub fn workspace_root(root: &Path) -> PathBuf {
    if root.is_file() {
        root.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        root.to_path_buf()
    }
}

/// Load configuration and install logging.
pub fn load_config(
    global: &GlobalOptions,
    workspace: &Path,
    overrides: ConfigOverrides,
) -> Result<AdpConfig> {
    let mut loader = ConfigLoader::new();

    let config = match global.config {
        Some(ref config_path) => loader
            .load_file(config_path, Some(&overrides))
            .with_context(|| format!("Failed to load config file {}", config_path.display()))?,
        None => loader
            .load(workspace, Some(&overrides))
            .context("Failed to load configuration")?,
    };

    crate::init_logging(&config.logging)?;
    Ok(config)
}

/// Scan a target with the effective configuration.
pub fn run_scan(global: &GlobalOptions, target: &ScanTarget) -> Result<(AdpConfig, ScanReport)> {
    let root = target
        .path
        .canonicalize()
        .with_context(|| format!("Path not found: {}", target.path.display()))?;
    let workspace = workspace_root(&root);

    let mut overrides = global.to_config_overrides()?;
    if target.strict {
        overrides.strict = Some(true);
    }
    overrides.exclude_patterns = target.exclude.clone();

    let config = load_config(global, &workspace, overrides)?;
    let schema = config
        .load_schema(&workspace)
        .context("Failed to load schema")?;

    info!("Scanning {} with schema {}", root.display(), schema.label());
    let scanner = Scanner::new(config.language_registry(), schema, config.scan_options())
        .context("Failed to prepare scanner")?;

    let report = scanner
        .scan_paths(&root, &CancellationToken::new())
        .with_context(|| format!("Scan of {} failed", root.display()))?;

    Ok((config, report))
}

/// Exit status for a finished scan under the caller's strictness.
pub fn exit_status(report: &ScanReport, strict: bool) -> ExitCode {
    if report.has_failures(strict) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}
