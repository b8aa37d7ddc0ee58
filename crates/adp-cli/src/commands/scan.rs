//! Scan command - extract, validate and assemble

use std::process::ExitCode;

use adp_core::{stats, ScanReport, Severity};
use anyhow::Result;
use clap::Args;
use serde_json::json;

use super::{exit_status, print_json, run_scan, ScanTarget};
use crate::GlobalOptions;

/// Arguments for the scan command
#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    target: ScanTarget,

    /// Show entity counts by scope and relationship kind
    #[arg(long)]
    stats: bool,

    /// Include info-level diagnostics
    #[arg(long)]
    all: bool,
}

/// Execute the scan command
pub fn execute(args: ScanArgs, global: GlobalOptions) -> Result<ExitCode> {
    let (config, report) = run_scan(&global, &args.target)?;
    let strict = config.scan.strict;

    if global.json {
        print_json(&json!({
            "files_scanned": report.files_scanned,
            "summary": report.summary(),
            "stats": stats(&report.graph),
            "graph": report.graph.export(),
            "diagnostics": report.diagnostics,
        }))?;
    } else {
        print_text(&report, &args, global.quiet);
    }

    Ok(exit_status(&report, strict))
}

fn print_text(report: &ScanReport, args: &ScanArgs, quiet: bool) {
    for diagnostic in &report.diagnostics {
        let shown = match diagnostic.severity {
            Severity::Error => true,
            Severity::Warning => !quiet,
            Severity::Info => args.all && !quiet,
        };
        if shown {
            println!("{}", diagnostic);
        }
    }

    if quiet {
        return;
    }

    let graph_stats = stats(&report.graph);
    let summary = report.summary();
    if !report.diagnostics.is_empty() {
        println!();
    }
    println!(
        "Scanned {} files: {} entities, {} relationships ({} dangling)",
        report.files_scanned, graph_stats.entities, graph_stats.relationships, graph_stats.dangling
    );
    println!(
        "{} errors, {} warnings, {} notes",
        summary.errors, summary.warnings, summary.infos
    );

    if args.stats {
        println!("\nEntities by scope:");
        for (scope, count) in &graph_stats.by_scope {
            println!("  {}: {}", scope, count);
        }

        println!("\nRelationships by kind:");
        for (kind, count) in &graph_stats.by_kind {
            println!("  {}: {}", kind, count);
        }

        println!(
            "\nDomains: {} ({} entities unassigned)",
            graph_stats.domains, graph_stats.unassigned
        );
    }
}
