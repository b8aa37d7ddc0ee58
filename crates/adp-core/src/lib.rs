//! ADP Core - Annotation extraction and knowledge graph assembly
//!
//! This crate provides the engine behind `adp`:
//! - Language profiles and a lightweight comment locator
//! - Scope resolution from structural cues (keywords, braces, indentation)
//! - Payload extraction and schema validation with located diagnostics
//! - Deterministic entity ids and cross-file graph assembly
//! - Graph queries: cycles, domain clusters, cross-domain edges, traversal

pub mod assembler;
pub mod diagnostics;
pub mod entity;
pub mod extractor;
pub mod graph;
pub mod language;
pub mod locator;
pub mod query;
pub mod scan;
pub mod schema;
pub mod scope;
pub mod source;
pub mod validator;

// Re-exports for convenience
pub use diagnostics::{sort_diagnostics, Diagnostic, DiagnosticCode, DiagnosticSummary, Severity};
pub use language::{BlockStyle, LanguageProfile, LanguageRegistry, MethodStyle};
pub use locator::{locate, CommentKind, CommentSpan, CommentSpans};
pub use scope::{Declaration, ScopeKind, ScopeRef, StructuralIndex, StructuralPatterns};
pub use source::{normalize_path, LineIndex};

// Extraction and validation re-exports
pub use extractor::{extract, AnnotationPayload, DEFAULT_MARKER};
pub use schema::{Schema, SchemaDocument, SchemaError, SchemaField, ValueKind};
pub use validator::{validate, ValidationMode, Validated};

// Graph re-exports
pub use assembler::{assemble, AnnotatedEntity, AssemblerConfig, FileBatch, MatchStrategy};
pub use entity::{
    declared_relationships, entity_id, EdgeTarget, Entity, Relationship, RelationshipFields,
    RelationshipKind, SourceLocation,
};
pub use graph::{GraphExport, KnowledgeGraph, GRAPH_FORMAT_VERSION};
pub use query::{
    cross_domain_edges, dependencies_within, dependents_of, domain_clusters, find_cycles, stats,
    DomainClusters, GraphStats, QueryError,
};

// Scan driver re-exports
pub use scan::{
    collect_files, CancellationToken, ScanError, ScanOptions, ScanReport, Scanner, SourceInput,
};
