//! Graph commands - cycles, domain clusters and dependency traversal

use std::process::ExitCode;

use adp_core::{
    cross_domain_edges, dependencies_within, dependents_of, domain_clusters, find_cycles, Entity,
    KnowledgeGraph, ScanReport,
};
use anyhow::{bail, Result};
use clap::Args;
use serde_json::json;

use super::{print_info, print_json, run_scan, ScanTarget};
use crate::GlobalOptions;

/// Arguments for the cycles command
#[derive(Args, Debug)]
pub struct CyclesArgs {
    #[command(flatten)]
    target: ScanTarget,
}

/// Arguments for the domains command
#[derive(Args, Debug)]
pub struct DomainsArgs {
    #[command(flatten)]
    target: ScanTarget,

    /// Also list dependencies that cross domain boundaries
    #[arg(long)]
    cross: bool,
}

/// Arguments for the deps command
#[derive(Args, Debug)]
pub struct DepsArgs {
    /// Entity name or id
    name: String,

    #[command(flatten)]
    target: ScanTarget,

    /// Maximum number of hops
    #[arg(long, short = 'd', default_value = "3")]
    depth: usize,

    /// Show entities that depend on NAME instead
    #[arg(long, short = 'r')]
    reverse: bool,
}

fn label(entity: &Entity) -> String {
    format!("{} ({} at {})", entity.name, entity.scope.kind, entity.location)
}

fn name_of<'g>(graph: &'g KnowledgeGraph, id: &'g str) -> &'g str {
    graph.entity(id).map(|e| e.name.as_str()).unwrap_or(id)
}

/// Note scan problems on stderr; graph commands still answer.
fn note_scan_problems(report: &ScanReport, quiet: bool) {
    let summary = report.summary();
    if summary.errors > 0 || summary.warnings > 0 {
        print_info(
            &format!(
                "note: scan reported {} errors and {} warnings (run `adp scan` for details)",
                summary.errors, summary.warnings
            ),
            quiet,
        );
    }
}

/// Find one entity by id, then by name.
fn resolve_entity<'g>(graph: &'g KnowledgeGraph, key: &str) -> Result<&'g Entity> {
    if let Some(entity) = graph.entity(key) {
        return Ok(entity);
    }

    let matches = graph.find_by_name(key);
    match matches.as_slice() {
        [] => bail!("No entity named '{}'", key),
        [entity] => Ok(*entity),
        many => {
            let candidates: Vec<String> = many
                .iter()
                .map(|e| format!("  {}  {}", e.id, label(e)))
                .collect();
            bail!(
                "'{}' matches {} entities; pass an id instead:\n{}",
                key,
                many.len(),
                candidates.join("\n")
            )
        }
    }
}

// ============================================================================
// Cycles
// ============================================================================

/// Execute the cycles command
pub fn execute_cycles(args: CyclesArgs, global: GlobalOptions) -> Result<ExitCode> {
    let (_, report) = run_scan(&global, &args.target)?;
    let graph = &report.graph;
    let cycles = find_cycles(graph);

    if global.json {
        let rendered: Vec<_> = cycles
            .iter()
            .map(|cycle| {
                cycle
                    .iter()
                    .map(|id| json!({"id": id, "name": name_of(graph, id)}))
                    .collect::<Vec<_>>()
            })
            .collect();
        print_json(&rendered)?;
    } else if cycles.is_empty() {
        println!("No dependency cycles found.");
    } else {
        println!("Found {} dependency cycle(s):", cycles.len());
        for (i, cycle) in cycles.iter().enumerate() {
            let mut names: Vec<&str> = cycle.iter().map(|id| name_of(graph, id)).collect();
            if let Some(first) = names.first().copied() {
                names.push(first);
            }
            println!("  {}. {}", i + 1, names.join(" -> "));
        }
    }

    note_scan_problems(&report, global.quiet || global.json);
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Domains
// ============================================================================

/// Execute the domains command
pub fn execute_domains(args: DomainsArgs, global: GlobalOptions) -> Result<ExitCode> {
    let (_, report) = run_scan(&global, &args.target)?;
    let graph = &report.graph;
    let clusters = domain_clusters(graph);
    let cross = if args.cross {
        cross_domain_edges(graph)
    } else {
        Vec::new()
    };

    if global.json {
        let mut value = json!({
            "domains": clusters.domains,
            "unassigned": clusters.unassigned,
        });
        if args.cross {
            value["cross_domain"] = json!(cross);
        }
        print_json(&value)?;
    } else {
        for (domain, members) in &clusters.domains {
            println!("{} ({})", domain, members.len());
            for id in members {
                if let Some(entity) = graph.entity(id) {
                    println!("  - {}", label(entity));
                }
            }
        }
        if !clusters.unassigned.is_empty() {
            println!("(no domain) ({})", clusters.unassigned.len());
            for id in &clusters.unassigned {
                if let Some(entity) = graph.entity(id) {
                    println!("  - {}", label(entity));
                }
            }
        }

        if args.cross {
            println!("\nCross-domain dependencies: {}", cross.len());
            for edge in &cross {
                let to = edge.target_id().unwrap_or_default();
                println!(
                    "  {} [{}] -> {} [{}]",
                    name_of(graph, &edge.from),
                    graph.domain_of(&edge.from).unwrap_or("-"),
                    name_of(graph, to),
                    graph.domain_of(to).unwrap_or("-"),
                );
            }
        }
    }

    note_scan_problems(&report, global.quiet || global.json);
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Dependencies
// ============================================================================

/// Execute the deps command
pub fn execute_deps(args: DepsArgs, global: GlobalOptions) -> Result<ExitCode> {
    let (_, report) = run_scan(&global, &args.target)?;
    let graph = &report.graph;
    let root = resolve_entity(graph, &args.name)?;

    let reached = if args.reverse {
        dependents_of(graph, &root.id, args.depth)?
    } else {
        dependencies_within(graph, &root.id, args.depth)?
    };

    if global.json {
        let direction = if args.reverse {
            "dependents"
        } else {
            "dependencies"
        };
        let rendered: Vec<_> = reached
            .iter()
            .map(|(id, depth)| json!({"id": id, "name": name_of(graph, id), "depth": depth}))
            .collect();
        print_json(&json!({
            "root": {"id": root.id, "name": root.name},
            "direction": direction,
            "entities": rendered,
        }))?;
    } else {
        let heading = if args.reverse {
            "Depended on by"
        } else {
            "Depends on"
        };
        println!("{}", label(root));
        if reached.is_empty() {
            println!("  {}: nothing within {} hop(s)", heading, args.depth);
        } else {
            println!("  {} ({} within {} hop(s)):", heading, reached.len(), args.depth);
            for (id, depth) in &reached {
                let indent = "  ".repeat(*depth);
                match graph.entity(id) {
                    Some(entity) => println!("  {}{}", indent, label(entity)),
                    None => println!("  {}{}", indent, id),
                }
            }
        }

        let dangling: Vec<String> = graph
            .outgoing(&root.id)
            .filter(|r| r.is_dangling())
            .map(|r| r.to.to_string())
            .collect();
        if !args.reverse && !dangling.is_empty() {
            println!("  Unresolved: {}", dangling.join(", "));
        }
    }

    note_scan_problems(&report, global.quiet || global.json);
    Ok(ExitCode::SUCCESS)
}
