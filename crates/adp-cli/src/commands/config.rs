//! Config command - View and initialize configuration
//!
//! - Show the effective (merged) configuration
//! - Show configuration file paths
//! - Create a default config file (local or global)

use std::path::PathBuf;
use std::process::ExitCode;

use adp_config::ConfigLoader;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::json;

use super::{load_config, print_info, print_json};
use crate::GlobalOptions;

/// Config management commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show(ConfigArgs),

    /// Show configuration file paths
    Path(ConfigArgs),

    /// Write a default configuration file
    Init(InitArgs),
}

/// Workspace the configuration applies to
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Workspace directory
    #[arg(long, short = 'w', default_value = ".")]
    workspace: PathBuf,
}

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Create ~/.adp/config.toml instead of the workspace config
    #[arg(long)]
    global: bool,

    #[command(flatten)]
    target: ConfigArgs,
}

/// Execute a config command
pub fn execute(cmd: ConfigCommand, global: GlobalOptions) -> Result<ExitCode> {
    match cmd {
        ConfigCommand::Show(args) => {
            let workspace = args
                .workspace
                .canonicalize()
                .with_context(|| format!("Workspace not found: {}", args.workspace.display()))?;
            let config = load_config(&global, &workspace, global.to_config_overrides()?)?;
            if global.json {
                print_json(&config)?;
            } else {
                print!(
                    "{}",
                    toml::to_string_pretty(&config).context("Failed to render configuration")?
                );
            }
        }
        ConfigCommand::Path(args) => {
            let loader = ConfigLoader::new();
            let global_path = loader.global_config_path();
            let local_path = loader.local_config_path(&args.workspace);
            if global.json {
                print_json(&json!({
                    "global": global_path,
                    "local": local_path,
                    "explicit": global.config,
                }))?;
            } else {
                match global_path {
                    Some(path) => println!("global: {}", path.display()),
                    None => println!("global: (no home directory)"),
                }
                println!("local:  {}", local_path.display());
                if let Some(ref path) = global.config {
                    println!("explicit: {}", path.display());
                }
            }
        }
        ConfigCommand::Init(args) => {
            let loader = ConfigLoader::new();
            let path = if args.global {
                loader.init_global()
            } else {
                loader.init_local(&args.target.workspace)
            }
            .context("Failed to initialize configuration")?;
            print_info(&format!("Config file: {}", path.display()), global.quiet);
        }
    }

    Ok(ExitCode::SUCCESS)
}
