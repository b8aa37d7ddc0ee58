//! ADP CLI - Annotation knowledge graphs from source trees
//!
//! Scans source files for structured `@ai-metadata` annotations, validates
//! them against a schema and answers questions about the resulting graph.
//!
//! # Usage
//!
//! ```bash
//! # Scan the current directory and report diagnostics
//! adp scan
//!
//! # Fail on warnings too, with JSON output
//! adp scan src --strict --json
//!
//! # Dependency cycles and domain clusters
//! adp cycles
//! adp domains --cross
//!
//! # What does Checkout depend on, up to two hops?
//! adp deps Checkout --depth 2
//! ```

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use adp_config::{ConfigOverrides, LogFormat, LoggingConfig};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;

/// ADP - Annotation extraction and knowledge graph analysis
#[derive(Parser, Debug)]
#[command(name = "adp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalOptions {
    /// Path to a configuration file (replaces the global and local config)
    #[arg(long, short = 'c', global = true, env = "ADP_CONFIG")]
    config: Option<PathBuf>,

    /// Schema document to validate annotations against
    #[arg(long, global = true, env = "ADP_SCHEMA")]
    schema: Option<PathBuf>,

    /// Token that introduces an annotation payload
    #[arg(long, global = true, env = "ADP_MARKER")]
    marker: Option<String>,

    /// Number of parallel workers (0 = auto)
    #[arg(long, short = 'j', global = true)]
    jobs: Option<usize>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

impl GlobalOptions {
    /// Convert global options to config overrides
    pub fn to_config_overrides(&self) -> Result<ConfigOverrides> {
        let schema_path = match self.schema {
            Some(ref path) => Some(
                std::path::absolute(path)
                    .with_context(|| format!("Invalid schema path: {}", path.display()))?,
            ),
            None => None,
        };

        Ok(ConfigOverrides {
            marker: self.marker.clone(),
            schema_path,
            parallelism: self.jobs,
            log_level: if self.quiet {
                Some("error".to_string())
            } else if self.verbose {
                Some("debug".to_string())
            } else {
                None
            },
            ..Default::default()
        })
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan files, validate annotations and report diagnostics
    Scan(commands::scan::ScanArgs),

    /// List dependency cycles
    Cycles(commands::graph::CyclesArgs),

    /// Group entities by domain
    Domains(commands::graph::DomainsArgs),

    /// Show what an entity depends on (or what depends on it)
    Deps(commands::graph::DepsArgs),

    /// Inspect and check schemas
    #[command(subcommand)]
    Schema(commands::schema::SchemaCommand),

    /// View and initialize configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

/// Install the stderr subscriber for the rest of the process.
pub fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => tracing::subscriber::set_global_default(
            builder.with_ansi(std::io::stderr().is_terminal()).finish(),
        )?,
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(args) => commands::scan::execute(args, cli.global),
        Commands::Cycles(args) => commands::graph::execute_cycles(args, cli.global),
        Commands::Domains(args) => commands::graph::execute_domains(args, cli.global),
        Commands::Deps(args) => commands::graph::execute_deps(args, cli.global),
        Commands::Schema(cmd) => commands::schema::execute(cmd, cli.global),
        Commands::Config(cmd) => commands::config::execute(cmd, cli.global),
    }
}
