//! Common test utilities for adp-core integration tests.
//!
//! Provides a representative schema, scanner construction and helpers for
//! building inputs in memory or on disk.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use adp_core::{
    CancellationToken, DiagnosticCode, Entity, KnowledgeGraph, LanguageRegistry, ScanOptions,
    ScanReport, Scanner, Schema, SchemaField, SourceInput, ValidationMode, ValueKind,
};

/// Schema close to the shipped default document.
pub fn core_schema() -> Schema {
    Schema::new("core", "1")
        .with_field(SchemaField::new("description", ValueKind::String).required())
        .with_field(SchemaField::new("name", ValueKind::String))
        .with_field(SchemaField::new("domain", ValueKind::String))
        .with_field(SchemaField::new("owner", ValueKind::String))
        .with_field(SchemaField::new("dependencies", ValueKind::Array).items(ValueKind::String))
        .with_field(SchemaField::new("techDebt", ValueKind::Object).sub_schema("techDebt"))
        .with_field(SchemaField::new("performance", ValueKind::Array).sub_schema("performance"))
        .with_definition(
            "techDebt",
            Schema::new("techDebt", "1").with_field(
                SchemaField::new("severity", ValueKind::String)
                    .required()
                    .allowed(["low", "medium", "high"]),
            ),
        )
        .with_definition(
            "performance",
            Schema::new("performance", "1")
                .with_field(SchemaField::new("metric", ValueKind::String).required())
                .with_field(SchemaField::new("target", ValueKind::Number)),
        )
}

pub fn scanner_with(options: ScanOptions) -> Scanner {
    Scanner::new(
        LanguageRegistry::with_builtins(),
        Arc::new(core_schema()),
        options,
    )
    .expect("builtin profiles compile")
}

pub fn scanner(mode: ValidationMode) -> Scanner {
    scanner_with(ScanOptions {
        mode,
        ..ScanOptions::default()
    })
}

/// In-memory input with the profile chosen by extension.
pub fn input(path: &str, text: &str) -> SourceInput {
    let profile = LanguageRegistry::with_builtins()
        .for_path(Path::new(path))
        .expect("supported extension");
    SourceInput::new(path, text, profile)
}

pub fn scan(inputs: &[SourceInput]) -> ScanReport {
    scanner(ValidationMode::Lenient)
        .scan(inputs, &CancellationToken::new())
        .expect("scan completes")
}

/// Python file holding one annotated class.
pub fn python_class(name: &str, payload: &str) -> SourceInput {
    input(
        &format!("{}.py", name.to_lowercase()),
        &format!("# @ai-metadata {}\nclass {}:\n    pass\n", payload, name),
    )
}

pub fn entity_named<'g>(graph: &'g KnowledgeGraph, name: &str) -> &'g Entity {
    let found = graph.find_by_name(name);
    assert_eq!(found.len(), 1, "expected exactly one entity named {name}");
    found[0]
}

pub fn count_code(report: &ScanReport, code: DiagnosticCode) -> usize {
    report.diagnostics.iter().filter(|d| d.code == code).count()
}

/// Write `(relative path, content)` pairs under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, content).expect("write fixture");
    }
}

/// Stable JSON view of a report for equality checks.
pub fn snapshot(report: &ScanReport) -> serde_json::Value {
    serde_json::json!({
        "graph": report.graph.export(),
        "diagnostics": report.diagnostics,
    })
}
