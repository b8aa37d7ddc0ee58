//! Schema command - inspect and check schema documents

use std::path::PathBuf;
use std::process::ExitCode;

use adp_config::{load_schema_file, AdpConfig, ConfigError, SchemaFormat};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::json;

use super::{load_config, print_json};
use crate::GlobalOptions;

/// Schema commands
#[derive(Subcommand, Debug)]
pub enum SchemaCommand {
    /// Print the schema a scan would validate against
    Show(ShowArgs),

    /// List available schemas
    List(WorkspaceArgs),

    /// Check a schema document without scanning
    Check(CheckArgs),
}

/// Workspace whose configuration selects the schema
#[derive(Args, Debug)]
pub struct WorkspaceArgs {
    /// Workspace directory
    #[arg(long, short = 'w', default_value = ".")]
    workspace: PathBuf,
}

/// Arguments for the show command
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Output format (yaml, json, toml)
    #[arg(long, short = 'f', value_parser = parse_format)]
    format: Option<SchemaFormat>,

    #[command(flatten)]
    workspace: WorkspaceArgs,
}

/// Arguments for the check command
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Schema document (.yaml, .yml, .json or .toml)
    file: PathBuf,
}

/// Parse a schema format from string
fn parse_format(s: &str) -> Result<SchemaFormat, String> {
    s.parse().map_err(|e: ConfigError| e.to_string())
}

fn workspace_config(global: &GlobalOptions, args: &WorkspaceArgs) -> Result<(PathBuf, AdpConfig)> {
    let workspace = args
        .workspace
        .canonicalize()
        .with_context(|| format!("Workspace not found: {}", args.workspace.display()))?;
    let config = load_config(global, &workspace, global.to_config_overrides()?)?;
    Ok((workspace, config))
}

/// Execute a schema command
pub fn execute(cmd: SchemaCommand, global: GlobalOptions) -> Result<ExitCode> {
    match cmd {
        SchemaCommand::Show(args) => execute_show(args, &global),
        SchemaCommand::List(args) => execute_list(args, &global),
        SchemaCommand::Check(args) => execute_check(args, &global),
    }
}

fn execute_show(args: ShowArgs, global: &GlobalOptions) -> Result<ExitCode> {
    let (workspace, config) = workspace_config(global, &args.workspace)?;
    let schema = config
        .load_schema(&workspace)
        .context("Failed to load schema")?;

    let format = match args.format {
        Some(format) => format,
        None if global.json => SchemaFormat::Json,
        None => SchemaFormat::Yaml,
    };
    let rendered = format
        .render(&schema.to_document())
        .context("Failed to render schema")?;
    print!("{}", rendered);
    if !rendered.ends_with('\n') {
        println!();
    }

    Ok(ExitCode::SUCCESS)
}

fn execute_list(args: WorkspaceArgs, global: &GlobalOptions) -> Result<ExitCode> {
    let (workspace, config) = workspace_config(global, &args)?;
    let registry = config
        .schema_registry(&workspace)
        .context("Failed to load schemas")?;
    let active = config
        .load_schema(&workspace)
        .context("Failed to load schema")?;

    if global.json {
        print_json(&json!({
            "schemas": registry.names(),
            "active": active.name,
        }))?;
    } else {
        for name in registry.names() {
            let schema = registry.get(name)?;
            let marker = if name == active.name { "*" } else { " " };
            println!(
                "{} {} ({} fields, {} definitions)",
                marker,
                schema.label(),
                schema.fields.len(),
                schema.definitions.len()
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn execute_check(args: CheckArgs, global: &GlobalOptions) -> Result<ExitCode> {
    let schema = load_schema_file(&args.file)
        .with_context(|| format!("Schema check failed for {}", args.file.display()))?;

    if global.json {
        print_json(&json!({
            "name": schema.name,
            "version": schema.version,
            "fields": schema.fields.len(),
            "required": schema.required_fields().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            "definitions": schema.definitions.keys().collect::<Vec<_>>(),
        }))?;
    } else if !global.quiet {
        println!(
            "ok: {} ({} fields, {} definitions)",
            schema.label(),
            schema.fields.len(),
            schema.definitions.len()
        );
    }

    Ok(ExitCode::SUCCESS)
}
