//! Graph Assembler
//!
//! Merges the per-file batches of a scan run into one [`KnowledgeGraph`]:
//!
//! 1. Union all entities. A repeated id within the run is replaced by the
//!    later definition (last-scan-wins) together with its declared edges.
//! 2. Resolve declared names (dependencies, owners, parents, interfaces,
//!    callees) to entity ids using the configured [`MatchStrategy`] order.
//!    The first strategy that yields a candidate wins; unresolved
//!    dependencies stay dangling with a warning, other kinds keep the name
//!    silently.
//! 3. Derive the domain index from the final entity set.
//!
//! Batches are sorted by path and candidates are visited in id order, so the
//! result does not depend on the order in which files were scanned.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diagnostics::{sort_diagnostics, Diagnostic, DiagnosticCode};
use crate::entity::{EdgeTarget, Entity, Relationship, RelationshipKind};
use crate::graph::KnowledgeGraph;
use crate::scope::ScopeKind;
use crate::source::{file_name, normalize_path, parent_dir};

// ============================================================================
// Batches
// ============================================================================

/// An entity with the relationships its payload declared.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedEntity {
    pub entity: Entity,
    /// Declared edges, targets still unresolved names
    pub relationships: Vec<Relationship>,
}

/// Output of the per-file pipeline for one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileBatch {
    /// Normalized file path
    pub path: String,
    pub entities: Vec<AnnotatedEntity>,
    pub diagnostics: Vec<Diagnostic>,
}

impl FileBatch {
    pub fn new(path: &str) -> Self {
        Self {
            path: normalize_path(path),
            ..Self::default()
        }
    }

    /// A batch carrying only diagnostics (unreadable file, timeout).
    pub fn failed(path: &str, diagnostic: Diagnostic) -> Self {
        Self {
            diagnostics: vec![diagnostic],
            ..Self::new(path)
        }
    }
}

// ============================================================================
// Match Strategies
// ============================================================================

/// How a declared name is matched against known entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    /// Scope name, qualified name or `name` field equality
    ExactName,
    /// Normalized file path equality, also relative to the declaring file
    FilePath,
    /// Case-insensitive substring of a scope name or file name
    FuzzyName,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::ExactName => "exact-name",
            MatchStrategy::FilePath => "file-path",
            MatchStrategy::FuzzyName => "fuzzy-name",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact-name" | "exact_name" | "exact" => Ok(MatchStrategy::ExactName),
            "file-path" | "file_path" | "path" => Ok(MatchStrategy::FilePath),
            "fuzzy-name" | "fuzzy_name" | "fuzzy" => Ok(MatchStrategy::FuzzyName),
            other => Err(format!(
                "unknown match strategy '{}' (expected exact-name, file-path or fuzzy-name)",
                other
            )),
        }
    }
}

/// Assembler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Strategies tried in order; the first match wins
    pub strategies: Vec<MatchStrategy>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            strategies: vec![
                MatchStrategy::ExactName,
                MatchStrategy::FilePath,
                MatchStrategy::FuzzyName,
            ],
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

struct Resolver<'a> {
    /// Candidates in id order
    candidates: Vec<&'a Entity>,
    strategies: &'a [MatchStrategy],
}

impl<'a> Resolver<'a> {
    fn new(entities: &'a BTreeMap<String, Entity>, config: &'a AssemblerConfig) -> Self {
        Self {
            candidates: entities.values().collect(),
            strategies: &config.strategies,
        }
    }

    fn resolve(&self, from: &Entity, name: &str) -> Option<&'a Entity> {
        self.strategies
            .iter()
            .find_map(|strategy| self.resolve_with(*strategy, from, name))
    }

    fn resolve_with(
        &self,
        strategy: MatchStrategy,
        from: &Entity,
        name: &str,
    ) -> Option<&'a Entity> {
        let others = || self.candidates.iter().copied().filter(|c| c.id != from.id);
        match strategy {
            MatchStrategy::ExactName => others().find(|c| {
                (!c.scope.name.is_empty() && c.scope.name == name)
                    || c.name == name
                    || (!c.scope.path.is_empty() && c.scope.qualified_name() == name)
            }),
            MatchStrategy::FilePath => {
                let direct = normalize_path(name);
                let dir = parent_dir(&from.file);
                let relative = if dir.is_empty() {
                    direct.clone()
                } else {
                    normalize_path(&format!("{}/{}", dir, name))
                };
                let matches = |c: &&Entity| c.file == direct || c.file == relative;
                others()
                    .filter(matches)
                    .find(|c| c.scope.kind == ScopeKind::File)
                    .or_else(|| others().find(matches))
            }
            MatchStrategy::FuzzyName => {
                let needle = name.trim().to_lowercase();
                if needle.is_empty() {
                    return None;
                }
                others().find(|c| {
                    let scope_hit = !c.scope.is_anonymous()
                        && !c.scope.name.is_empty()
                        && c.scope.name.to_lowercase().contains(&needle);
                    scope_hit || file_name(&c.file).to_lowercase().contains(&needle)
                })
            }
        }
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// Merge per-file batches into a knowledge graph.
///
/// Returns the graph and every diagnostic of the run (batch diagnostics plus
/// assembler findings) in report order.
pub fn assemble(
    batches: Vec<FileBatch>,
    config: &AssemblerConfig,
) -> (KnowledgeGraph, Vec<Diagnostic>) {
    let mut batches = batches;
    batches.sort_by(|a, b| a.path.cmp(&b.path));

    let mut diagnostics = Vec::new();
    let mut entities: BTreeMap<String, Entity> = BTreeMap::new();
    let mut declared: BTreeMap<String, Vec<Relationship>> = BTreeMap::new();

    // Step 1: union, last definition wins
    for batch in batches {
        diagnostics.extend(batch.diagnostics);
        for annotated in batch.entities {
            let entity = annotated.entity;
            if let Some(previous) = entities.get(&entity.id) {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::AssemblerInfo,
                    format!(
                        "entity `{}` redefined (previously at {}); last definition wins",
                        entity.name, previous.location
                    ),
                    entity.location.file.clone(),
                    entity.location.line,
                    entity.location.column,
                ));
            }
            declared.insert(entity.id.clone(), annotated.relationships);
            entities.insert(entity.id.clone(), entity);
        }
    }

    // Step 2: resolve declared names
    let resolver = Resolver::new(&entities, config);
    let mut relationships = Vec::new();
    for (id, rels) in declared {
        let Some(from) = entities.get(&id) else {
            continue;
        };
        for mut rel in rels {
            rel.from = id.clone();
            if rel.kind.targets_entity() {
                if let EdgeTarget::Name(name) = &rel.to {
                    match resolver.resolve(from, name) {
                        Some(target) => {
                            debug!("Resolved `{}` from {} to {}", name, from.id, target.id);
                            rel.to = EdgeTarget::Entity(target.id.clone());
                        }
                        None if rel.kind == RelationshipKind::Dependency => {
                            diagnostics.push(Diagnostic::new(
                                DiagnosticCode::AssemblerWarning,
                                format!(
                                    "unresolved dependency `{}` declared by `{}`",
                                    name, from.name
                                ),
                                from.location.file.clone(),
                                from.location.line,
                                from.location.column,
                            ));
                        }
                        None => {}
                    }
                }
            }
            relationships.push(rel);
        }
    }

    // Step 3: graph with derived domain index
    let graph = KnowledgeGraph::from_parts(entities, relationships);
    sort_diagnostics(&mut diagnostics);

    info!("Graph summary:");
    info!("  - Entities: {}", graph.entity_count());
    for kind in RelationshipKind::ALL {
        let count = graph.relationships_of_kind(kind).count();
        if count > 0 {
            info!("  - {} edges: {}", kind, count);
        }
    }
    let dangling = graph.dangling().count();
    if dangling > 0 {
        info!("  - Dangling dependencies: {}", dangling);
    }

    (graph, diagnostics)
}
