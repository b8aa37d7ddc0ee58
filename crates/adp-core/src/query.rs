//! Graph Query Engine
//!
//! Read-only analyses over an assembled [`KnowledgeGraph`]. Every result is
//! ordered by entity id, so repeated queries on equal graphs give equal
//! output.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::NodeIndex;
use petgraph::Direction;
use serde::Serialize;
use thiserror::Error;

use crate::entity::{Relationship, RelationshipKind};
use crate::graph::KnowledgeGraph;

/// Errors from graph queries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
}

// ============================================================================
// Cycle Detection
// ============================================================================

/// All elementary cycles of the dependency subgraph.
///
/// Each cycle starts at its lexicographically smallest id, and the list is
/// sorted, so the same cycle is never reported in two rotations.
pub fn find_cycles(graph: &KnowledgeGraph) -> Vec<Vec<String>> {
    let mut cycles = Vec::new();
    for component in tarjan_scc(graph.dependency_graph()) {
        if component.len() < 2 {
            continue;
        }
        let mut members: Vec<(String, NodeIndex)> = component
            .iter()
            .filter_map(|&idx| graph.node_id(idx).map(|id| (id.to_string(), idx)))
            .collect();
        members.sort();
        let ids: BTreeMap<NodeIndex, &str> =
            members.iter().map(|(id, idx)| (*idx, id.as_str())).collect();

        for (start_id, start) in &members {
            // Only nodes greater than the start may appear, so each cycle is
            // found exactly once, from its smallest member.
            let allowed: HashSet<NodeIndex> = ids
                .iter()
                .filter(|(_, id)| **id > start_id.as_str())
                .map(|(idx, _)| *idx)
                .collect();
            let mut path = vec![*start];
            cycles_from(graph, *start, *start, &allowed, &mut path, &mut cycles);
        }
    }
    cycles.sort();
    cycles
}

fn cycles_from(
    graph: &KnowledgeGraph,
    start: NodeIndex,
    current: NodeIndex,
    allowed: &HashSet<NodeIndex>,
    path: &mut Vec<NodeIndex>,
    out: &mut Vec<Vec<String>>,
) {
    for next in graph.neighbors_sorted(current, Direction::Outgoing) {
        if next == start {
            out.push(
                path.iter()
                    .filter_map(|&idx| graph.node_id(idx).map(str::to_string))
                    .collect(),
            );
        } else if allowed.contains(&next) && !path.contains(&next) {
            path.push(next);
            cycles_from(graph, start, next, allowed, path, out);
            path.pop();
        }
    }
}

// ============================================================================
// Domain Clustering
// ============================================================================

/// Entities grouped by domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainClusters {
    pub domains: BTreeMap<String, BTreeSet<String>>,
    /// Entities with no domain
    pub unassigned: BTreeSet<String>,
}

pub fn domain_clusters(graph: &KnowledgeGraph) -> DomainClusters {
    DomainClusters {
        domains: graph.domain_index().clone(),
        unassigned: graph
            .entities()
            .filter(|e| e.domain.is_none())
            .map(|e| e.id.clone())
            .collect(),
    }
}

// ============================================================================
// Cross-Domain Edges
// ============================================================================

/// Resolved Dependency/Ownership edges joining entities of different,
/// non-empty domains.
pub fn cross_domain_edges(graph: &KnowledgeGraph) -> Vec<&Relationship> {
    graph
        .relationships()
        .iter()
        .filter(|r| {
            matches!(
                r.kind,
                RelationshipKind::Dependency | RelationshipKind::Ownership
            )
        })
        .filter(|r| {
            let from = graph.domain_of(&r.from).filter(|d| !d.is_empty());
            let to = r
                .target_id()
                .and_then(|id| graph.domain_of(id))
                .filter(|d| !d.is_empty());
            matches!((from, to), (Some(a), Some(b)) if a != b)
        })
        .collect()
}

// ============================================================================
// Traversal
// ============================================================================

/// Entities reachable from `root` over outgoing dependency edges within
/// `max_depth` hops, with their BFS depth. The root itself is excluded.
pub fn dependencies_within(
    graph: &KnowledgeGraph,
    root: &str,
    max_depth: usize,
) -> Result<Vec<(String, usize)>, QueryError> {
    bfs(graph, root, max_depth, Direction::Outgoing)
}

/// Entities that reach `root` within `max_depth` hops (reverse traversal).
pub fn dependents_of(
    graph: &KnowledgeGraph,
    root: &str,
    max_depth: usize,
) -> Result<Vec<(String, usize)>, QueryError> {
    bfs(graph, root, max_depth, Direction::Incoming)
}

fn bfs(
    graph: &KnowledgeGraph,
    root: &str,
    max_depth: usize,
    direction: Direction,
) -> Result<Vec<(String, usize)>, QueryError> {
    let start = graph
        .node_index(root)
        .ok_or_else(|| QueryError::UnknownEntity(root.to_string()))?;

    let mut visited = HashSet::from([start]);
    let mut queue = VecDeque::from([(start, 0usize)]);
    let mut reached = Vec::new();

    while let Some((idx, depth)) = queue.pop_front() {
        if depth == max_depth {
            continue;
        }
        for next in graph.neighbors_sorted(idx, direction) {
            if visited.insert(next) {
                if let Some(id) = graph.node_id(next) {
                    reached.push((id.to_string(), depth + 1));
                }
                queue.push_back((next, depth + 1));
            }
        }
    }

    reached.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    Ok(reached)
}

// ============================================================================
// Statistics
// ============================================================================

/// Counts describing a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub entities: usize,
    pub relationships: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_scope: BTreeMap<String, usize>,
    pub dangling: usize,
    pub domains: usize,
    pub unassigned: usize,
}

pub fn stats(graph: &KnowledgeGraph) -> GraphStats {
    let mut by_kind = BTreeMap::new();
    for rel in graph.relationships() {
        *by_kind.entry(rel.kind.as_str().to_string()).or_insert(0) += 1;
    }
    let mut by_scope = BTreeMap::new();
    for entity in graph.entities() {
        *by_scope
            .entry(entity.scope.kind.as_str().to_string())
            .or_insert(0) += 1;
    }

    GraphStats {
        entities: graph.entity_count(),
        relationships: graph.relationships().len(),
        by_kind,
        by_scope,
        dangling: graph.dangling().count(),
        domains: graph.domain_index().len(),
        unassigned: graph.entities().filter(|e| e.domain.is_none()).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{build, EdgeTarget, Entity};
    use crate::scope::{ScopeKind, ScopeRef};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn entity(name: &str, domain: Option<&str>) -> Entity {
        let scope = ScopeRef {
            kind: ScopeKind::Class,
            name: name.to_string(),
            path: vec![],
            line: 1,
            column: 1,
        };
        let mut fields = BTreeMap::new();
        if let Some(domain) = domain {
            fields.insert("domain".to_string(), json!(domain));
        }
        build(&format!("{name}.rs"), &scope, fields)
    }

    fn edge(from: &Entity, to: &Entity, kind: RelationshipKind) -> Relationship {
        Relationship {
            from: from.id.clone(),
            to: EdgeTarget::Entity(to.id.clone()),
            kind,
            declared: to.name.clone(),
        }
    }

    fn graph(entities: &[&Entity], relationships: Vec<Relationship>) -> KnowledgeGraph {
        KnowledgeGraph::from_parts(
            entities.iter().map(|e| (e.id.clone(), (*e).clone())).collect(),
            relationships,
        )
    }

    fn smallest_first(ids: &[&str]) -> Vec<String> {
        let min = ids
            .iter()
            .enumerate()
            .min_by_key(|(_, id)| **id)
            .map(|(i, _)| i)
            .unwrap();
        ids[min..]
            .iter()
            .chain(ids[..min].iter())
            .map(|s| s.to_string())
            .collect()
    }

    // ========================================================================
    // Cycle Tests
    // ========================================================================

    #[test]
    fn test_single_cycle_in_canonical_rotation() {
        let (a, b, c, d) = (
            entity("A", None),
            entity("B", None),
            entity("C", None),
            entity("D", None),
        );
        let dep = RelationshipKind::Dependency;
        let g = graph(
            &[&a, &b, &c, &d],
            vec![edge(&a, &b, dep), edge(&b, &c, dep), edge(&c, &a, dep)],
        );
        let expected = vec![smallest_first(&[&a.id, &b.id, &c.id])];
        assert_eq!(find_cycles(&g), expected);

        let with_tail = graph(
            &[&a, &b, &c, &d],
            vec![
                edge(&a, &b, dep),
                edge(&b, &c, dep),
                edge(&c, &a, dep),
                edge(&d, &a, dep),
            ],
        );
        assert_eq!(find_cycles(&with_tail), expected);
    }

    #[test]
    fn test_overlapping_cycles() {
        let (a, b, c) = (entity("A", None), entity("B", None), entity("C", None));
        let dep = RelationshipKind::Dependency;
        let g = graph(
            &[&a, &b, &c],
            vec![
                edge(&a, &b, dep),
                edge(&b, &a, dep),
                edge(&b, &c, dep),
                edge(&c, &b, dep),
            ],
        );
        let cycles = find_cycles(&g);
        assert_eq!(cycles.len(), 2);
        assert!(cycles.contains(&smallest_first(&[&a.id, &b.id])));
        assert!(cycles.contains(&smallest_first(&[&b.id, &c.id])));
    }

    #[test]
    fn test_ownership_edges_do_not_form_cycles() {
        let (a, b) = (entity("A", None), entity("B", None));
        let g = graph(
            &[&a, &b],
            vec![
                edge(&a, &b, RelationshipKind::Dependency),
                edge(&b, &a, RelationshipKind::Ownership),
            ],
        );
        assert!(find_cycles(&g).is_empty());
    }

    // ========================================================================
    // Domain Tests
    // ========================================================================

    #[test]
    fn test_domain_clusters() {
        let (x, y, z) = (
            entity("X", Some("billing")),
            entity("Y", Some("auth")),
            entity("Z", None),
        );
        let clusters = domain_clusters(&graph(&[&x, &y, &z], vec![]));
        assert_eq!(clusters.domains.len(), 2);
        assert!(clusters.domains["billing"].contains(&x.id));
        assert_eq!(clusters.unassigned, BTreeSet::from([z.id.clone()]));
    }

    #[test]
    fn test_cross_domain_edges() {
        let x = entity("X", Some("billing"));
        let y = entity("Y", Some("auth"));
        let w = entity("W", Some("billing"));
        let dep = RelationshipKind::Dependency;
        let dangling = Relationship::unresolved(&x.id, dep, "Nowhere");
        let g = graph(
            &[&x, &y, &w],
            vec![edge(&x, &y, dep), edge(&x, &w, dep), dangling],
        );

        let cross = cross_domain_edges(&g);
        assert_eq!(cross.len(), 1);
        assert_eq!(cross[0].target_id(), Some(y.id.as_str()));
    }

    // ========================================================================
    // Traversal Tests
    // ========================================================================

    #[test]
    fn test_bounded_traversal_handles_cycles() {
        let (a, b, c, d) = (
            entity("A", None),
            entity("B", None),
            entity("C", None),
            entity("D", None),
        );
        let dep = RelationshipKind::Dependency;
        let g = graph(
            &[&a, &b, &c, &d],
            vec![
                edge(&a, &b, dep),
                edge(&b, &c, dep),
                edge(&c, &a, dep),
                edge(&c, &d, dep),
            ],
        );

        let one = dependencies_within(&g, &a.id, 1).unwrap();
        assert_eq!(one, vec![(b.id.clone(), 1)]);

        let all = dependencies_within(&g, &a.id, 10).unwrap();
        assert_eq!(
            all,
            vec![(b.id.clone(), 1), (c.id.clone(), 2), (d.id.clone(), 3)]
        );

        assert!(dependencies_within(&g, &a.id, 0).unwrap().is_empty());
        let reverse = dependents_of(&g, &d.id, 1).unwrap();
        assert_eq!(reverse, vec![(c.id.clone(), 1)]);
    }

    #[test]
    fn test_unknown_root() {
        let g = graph(&[], vec![]);
        assert_eq!(
            dependencies_within(&g, "missing", 2),
            Err(QueryError::UnknownEntity("missing".to_string()))
        );
    }

    #[test]
    fn test_stats() {
        let (a, b) = (entity("A", Some("core")), entity("B", None));
        let g = graph(
            &[&a, &b],
            vec![
                edge(&a, &b, RelationshipKind::Dependency),
                Relationship::unresolved(&a.id, RelationshipKind::Dependency, "gone"),
            ],
        );
        let s = stats(&g);
        assert_eq!(s.entities, 2);
        assert_eq!(s.relationships, 2);
        assert_eq!(s.dangling, 1);
        assert_eq!(s.by_kind["dependency"], 2);
        assert_eq!(s.by_scope["class"], 2);
        assert_eq!((s.domains, s.unassigned), (1, 1));
    }
}
