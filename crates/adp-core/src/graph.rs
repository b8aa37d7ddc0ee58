//! Knowledge Graph
//!
//! The assembled, immutable result of a scan run: entities keyed by id, every
//! relationship (resolved or dangling), and a domain index. Resolved
//! dependency edges are mirrored into a petgraph `StableGraph` for traversal
//! and cycle detection.
//!
//! A graph is only produced by the assembler and never mutated afterwards.
//! Rescanning yields a new instance.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::Direction;
use serde::Serialize;

use crate::entity::{Entity, Relationship, RelationshipKind};

/// Graph format version reported in exports.
pub const GRAPH_FORMAT_VERSION: &str = "1.0";

/// Petgraph view of resolved dependency edges. Node weights are entity ids.
pub(crate) type DependencyGraph = StableGraph<String, (), petgraph::Directed>;

/// Entities, relationships and the derived domain index.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    entities: BTreeMap<String, Entity>,
    relationships: Vec<Relationship>,
    domain_index: BTreeMap<String, BTreeSet<String>>,
    dependencies: DependencyGraph,
    node_index_map: HashMap<String, NodeIndex>,
}

impl KnowledgeGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from merged entities and resolved relationships.
    ///
    /// Relationships whose source entity is missing are dropped; the domain
    /// index is derived from the entities, never supplied.
    pub(crate) fn from_parts(
        entities: BTreeMap<String, Entity>,
        mut relationships: Vec<Relationship>,
    ) -> Self {
        relationships.retain(|r| entities.contains_key(&r.from));
        relationships.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        relationships.dedup();

        let mut domain_index: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entity in entities.values() {
            if let Some(domain) = &entity.domain {
                domain_index
                    .entry(domain.clone())
                    .or_default()
                    .insert(entity.id.clone());
            }
        }

        // Insert nodes in id order so node indices follow id order.
        let mut dependencies = DependencyGraph::default();
        let mut node_index_map = HashMap::with_capacity(entities.len());
        for id in entities.keys() {
            let idx = dependencies.add_node(id.clone());
            node_index_map.insert(id.clone(), idx);
        }
        for rel in relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Dependency)
        {
            let Some(target) = rel.target_id() else {
                continue;
            };
            if let (Some(&from), Some(&to)) = (node_index_map.get(&rel.from), node_index_map.get(target)) {
                if !dependencies.contains_edge(from, to) {
                    dependencies.add_edge(from, to, ());
                }
            }
        }

        Self {
            entities,
            relationships,
            domain_index,
            dependencies,
            node_index_map,
        }
    }

    // ------------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------------

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities whose display name, scope name or qualified name equals `name`.
    pub fn find_by_name(&self, name: &str) -> Vec<&Entity> {
        self.entities
            .values()
            .filter(|e| e.name == name || e.scope.name == name || e.scope.qualified_name() == name)
            .collect()
    }

    // ------------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------------

    /// All relationships in deterministic order.
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn relationships_of_kind(
        &self,
        kind: RelationshipKind,
    ) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(move |r| r.kind == kind)
    }

    /// Relationships declared by `id`.
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &Relationship> {
        let id = id.to_string();
        self.relationships.iter().filter(move |r| r.from == id)
    }

    /// Relationships resolved to `id`.
    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &Relationship> {
        let id = id.to_string();
        self.relationships
            .iter()
            .filter(move |r| r.target_id() == Some(id.as_str()))
    }

    /// Dependency edges whose target never resolved.
    pub fn dangling(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(|r| r.is_dangling())
    }

    // ------------------------------------------------------------------------
    // Domains
    // ------------------------------------------------------------------------

    /// Domain name → entity ids.
    pub fn domain_index(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.domain_index
    }

    pub fn domain_of(&self, id: &str) -> Option<&str> {
        self.entities.get(id).and_then(|e| e.domain.as_deref())
    }

    // ------------------------------------------------------------------------
    // Dependency Graph
    // ------------------------------------------------------------------------

    pub(crate) fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.node_index_map.get(id).copied()
    }

    pub(crate) fn node_id(&self, idx: NodeIndex) -> Option<&str> {
        self.dependencies.node_weight(idx).map(String::as_str)
    }

    pub(crate) fn dependency_graph(&self) -> &DependencyGraph {
        &self.dependencies
    }

    /// Direct dependency neighbors of `idx`, sorted by id.
    pub(crate) fn neighbors_sorted(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self
            .dependencies
            .neighbors_directed(idx, direction)
            .collect();
        out.sort_by(|a, b| self.node_id(*a).cmp(&self.node_id(*b)));
        out.dedup();
        out
    }

    pub fn dependency_edge_count(&self) -> usize {
        self.dependencies.edge_count()
    }

    // ------------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------------

    /// Serializable view of the whole graph.
    pub fn export(&self) -> GraphExport<'_> {
        GraphExport {
            version: GRAPH_FORMAT_VERSION,
            entities: self.entities.values().collect(),
            relationships: &self.relationships,
            domains: &self.domain_index,
        }
    }
}

/// Data shape handed to report writers.
#[derive(Debug, Serialize)]
pub struct GraphExport<'g> {
    pub version: &'static str,
    pub entities: Vec<&'g Entity>,
    pub relationships: &'g [Relationship],
    pub domains: &'g BTreeMap<String, BTreeSet<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{build, EdgeTarget};
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
        build(&format!("{name}.py"), &scope, fields)
    }

    fn dep(from: &Entity, to: &Entity) -> Relationship {
        Relationship {
            from: from.id.clone(),
            to: EdgeTarget::Entity(to.id.clone()),
            kind: RelationshipKind::Dependency,
            declared: to.name.clone(),
        }
    }

    fn graph(entities: &[&Entity], relationships: Vec<Relationship>) -> KnowledgeGraph {
        let map = entities
            .iter()
            .map(|e| (e.id.clone(), (*e).clone()))
            .collect();
        KnowledgeGraph::from_parts(map, relationships)
    }

    #[test]
    fn test_domain_index_is_derived() {
        let a = entity("A", Some("billing"));
        let b = entity("B", Some("billing"));
        let c = entity("C", None);
        let g = graph(&[&a, &b, &c], vec![]);

        let billing: Vec<&String> = g.domain_index()["billing"].iter().collect();
        assert_eq!(billing.len(), 2);
        assert_eq!(g.domain_of(&c.id), None);
        assert_eq!(g.domain_index().len(), 1);
    }

    #[test]
    fn test_orphan_relationships_are_dropped() {
        let a = entity("A", None);
        let b = entity("B", None);
        let g = graph(&[&a], vec![dep(&a, &b), dep(&b, &a)]);
        assert_eq!(g.relationships().len(), 1);
        assert_eq!(g.dependency_edge_count(), 0);
    }

    #[test]
    fn test_dependency_edges_mirrored() {
        let a = entity("A", None);
        let b = entity("B", None);
        let g = graph(&[&a, &b], vec![dep(&a, &b), dep(&a, &b)]);
        assert_eq!(g.relationships().len(), 1);
        assert_eq!(g.dependency_edge_count(), 1);
        assert_eq!(g.outgoing(&a.id).count(), 1);
        assert_eq!(g.incoming(&b.id).count(), 1);
        let idx = g.node_index(&a.id).unwrap();
        let neighbors = g.neighbors_sorted(idx, Direction::Outgoing);
        assert_eq!(g.node_id(neighbors[0]), Some(b.id.as_str()));
    }

    #[test]
    fn test_find_by_name_and_export() {
        let a = entity("Alpha", Some("core"));
        let g = graph(&[&a], vec![]);
        assert_eq!(g.find_by_name("Alpha").len(), 1);
        assert!(g.find_by_name("Beta").is_empty());

        let exported = serde_json::to_value(g.export()).unwrap();
        assert_eq!(exported["version"], json!(GRAPH_FORMAT_VERSION));
        assert_eq!(exported["entities"][0]["name"], json!("Alpha"));
        assert_eq!(exported["domains"]["core"], json!([a.id]));
    }
}
