//! Entity Builder
//!
//! Turns a validated payload and its scope into a graph [`Entity`] with a
//! deterministic id, and lists the relationships the payload declares.
//! Everything here is pure, so files can be processed in parallel.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::scope::ScopeRef;
use crate::source::{file_name, normalize_path};

/// Hex characters kept from the SHA-256 digest.
const ID_LEN: usize = 32;

// ============================================================================
// Entity
// ============================================================================

/// Where an entity's construct sits in its file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A graph node: one scoped, validated annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub scope: ScopeRef,
    /// Normalized file path
    pub file: String,
    /// Display name (`name` field, else scope name, else file name)
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Every validated field, including ones the schema does not declare
    pub raw_fields: BTreeMap<String, Value>,
    pub location: SourceLocation,
}

impl Entity {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.raw_fields.get(name)
    }
}

/// Deterministic entity id.
///
/// Hash over (normalized path, scope kind, enclosing path, scope name), plus
/// the line for anonymous scopes so two blocks in one function stay distinct.
pub fn entity_id(path: &str, scope: &ScopeRef) -> String {
    let normalized = normalize_path(path);
    let chain = scope.path.join("::");

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update([0u8]);
    hasher.update(scope.kind.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(chain.as_bytes());
    hasher.update([0u8]);
    hasher.update(scope.name.as_bytes());
    if scope.is_anonymous() {
        hasher.update([0u8]);
        hasher.update(scope.line.to_string().as_bytes());
    }

    let mut id = format!("{:x}", hasher.finalize());
    id.truncate(ID_LEN);
    id
}

/// Build the entity for one annotation.
pub fn build(path: &str, scope: &ScopeRef, fields: BTreeMap<String, Value>) -> Entity {
    let file = normalize_path(path);
    let text = |key: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let name = text("name").unwrap_or_else(|| {
        if scope.name.is_empty() {
            file_name(&file).to_string()
        } else {
            scope.name.clone()
        }
    });
    let domain = text("domain");
    let description = text("description");

    Entity {
        id: entity_id(&file, scope),
        scope: scope.clone(),
        name,
        domain,
        description,
        location: SourceLocation {
            file: file.clone(),
            line: scope.line,
            column: scope.column,
        },
        file,
        raw_fields: fields,
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// Kind of a directed edge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipKind {
    Dependency,
    DomainMembership,
    Ownership,
    /// Class inheritance
    Extends,
    /// Interface implementation
    Implements,
    /// Function call
    Calls,
    /// Membership in a service boundary; the target is the service name
    ServiceMembership,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 7] = [
        RelationshipKind::Dependency,
        RelationshipKind::DomainMembership,
        RelationshipKind::Ownership,
        RelationshipKind::Extends,
        RelationshipKind::Implements,
        RelationshipKind::Calls,
        RelationshipKind::ServiceMembership,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Dependency => "dependency",
            RelationshipKind::DomainMembership => "domain-membership",
            RelationshipKind::Ownership => "ownership",
            RelationshipKind::Extends => "extends",
            RelationshipKind::Implements => "implements",
            RelationshipKind::Calls => "calls",
            RelationshipKind::ServiceMembership => "service-membership",
        }
    }

    /// Whether the assembler resolves the declared name to an entity.
    /// Domain and service memberships always target the group name.
    pub fn targets_entity(&self) -> bool {
        !matches!(
            self,
            RelationshipKind::DomainMembership | RelationshipKind::ServiceMembership
        )
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Target of an edge: a resolved entity or a name that is still unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeTarget {
    Entity(String),
    Name(String),
}

impl EdgeTarget {
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            EdgeTarget::Entity(id) => Some(id),
            EdgeTarget::Name(_) => None,
        }
    }
}

impl fmt::Display for EdgeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeTarget::Entity(id) => write!(f, "{id}"),
            EdgeTarget::Name(name) => write!(f, "\"{name}\""),
        }
    }
}

/// A directed edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: EdgeTarget,
    pub kind: RelationshipKind,
    /// The name as written in the payload
    pub declared: String,
}

impl Relationship {
    pub fn unresolved(from: &str, kind: RelationshipKind, name: &str) -> Self {
        Self {
            from: from.to_string(),
            to: EdgeTarget::Name(name.to_string()),
            kind,
            declared: name.to_string(),
        }
    }

    /// A dependency that could not be resolved to an entity.
    pub fn is_dangling(&self) -> bool {
        self.kind == RelationshipKind::Dependency && matches!(self.to, EdgeTarget::Name(_))
    }

    pub fn target_id(&self) -> Option<&str> {
        self.to.entity_id()
    }

    /// Total order used for deterministic output.
    pub fn sort_key(&self) -> (&str, RelationshipKind, &str, &EdgeTarget) {
        (&self.from, self.kind, &self.declared, &self.to)
    }
}

/// Field names that declare relationships.
///
/// Dotted names reach into nested objects (`serviceBoundary.teamOwner`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipFields {
    pub dependencies: Vec<String>,
    pub owners: Vec<String>,
    /// Parent classes
    pub extends: Vec<String>,
    /// Implemented interfaces
    pub implements: Vec<String>,
    /// Called functions
    pub calls: Vec<String>,
    /// Service boundary names
    pub services: Vec<String>,
}

impl Default for RelationshipFields {
    fn default() -> Self {
        let owned =
            |names: &[&str]| -> Vec<String> { names.iter().map(|s| s.to_string()).collect() };
        Self {
            dependencies: owned(&["dependencies", "depends_on", "imports", "requires"]),
            owners: owned(&[
                "owner",
                "ownedBy",
                "teamOwner",
                "team_owner",
                "serviceBoundary.teamOwner",
                "service-boundary.teamOwner",
                "service_boundary.team_owner",
            ]),
            extends: owned(&["extends", "parent", "inherits", "superclass"]),
            implements: owned(&["implements", "interfaces"]),
            calls: owned(&["calls", "invokes", "uses_functions"]),
            services: owned(&[
                "service",
                "serviceBoundary.service",
                "service-boundary.service",
                "service_boundary.service",
            ]),
        }
    }
}

impl RelationshipFields {
    /// Field lists paired with the edge kind they declare, in emission order.
    pub fn kinds(&self) -> [(RelationshipKind, &[String]); 6] {
        [
            (RelationshipKind::Dependency, &self.dependencies),
            (RelationshipKind::Ownership, &self.owners),
            (RelationshipKind::Extends, &self.extends),
            (RelationshipKind::Implements, &self.implements),
            (RelationshipKind::Calls, &self.calls),
            (RelationshipKind::ServiceMembership, &self.services),
        ]
    }
}

fn lookup<'v>(fields: &'v BTreeMap<String, Value>, key: &str) -> Option<&'v Value> {
    if let Some(value) = fields.get(key) {
        return Some(value);
    }
    let mut segments = key.split('.');
    let first = fields.get(segments.next()?)?;
    segments.try_fold(first, |value, segment| value.get(segment))
}

fn object_name(value: &Value) -> Option<&str> {
    ["name", "target", "id"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
}

/// Names in a relationship field: a string, a list of strings, or objects
/// carrying a `name`/`target`.
fn names_in(value: &Value) -> Vec<&str> {
    let mut names = Vec::new();
    match value {
        Value::String(s) => names.push(s.as_str()),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => names.push(s.as_str()),
                    Value::Object(_) => names.extend(object_name(item)),
                    _ => {}
                }
            }
        }
        Value::Object(_) => names.extend(object_name(value)),
        _ => {}
    }
    names
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Relationships declared by an entity's fields, in declaration order,
/// without duplicates.
pub fn declared_relationships(entity: &Entity, config: &RelationshipFields) -> Vec<Relationship> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    let mut push = |kind: RelationshipKind, name: &str| {
        if seen.insert((kind, name.to_string())) {
            out.push(Relationship::unresolved(&entity.id, kind, name));
        }
    };

    for (kind, keys) in config.kinds() {
        for key in keys {
            if let Some(value) = lookup(&entity.raw_fields, key) {
                for name in names_in(value) {
                    push(kind, name);
                }
            }
        }
    }
    if let Some(domain) = &entity.domain {
        push(RelationshipKind::DomainMembership, domain);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    fn function_scope(name: &str, path: &[&str], line: usize) -> ScopeRef {
        ScopeRef {
            kind: ScopeKind::Function,
            name: name.to_string(),
            path: path.iter().map(|s| s.to_string()).collect(),
            line,
            column: 5,
        }
    }

    // ========================================================================
    // Identity Tests
    // ========================================================================

    #[test]
    fn test_id_is_stable_and_normalized() {
        let scope = function_scope("charge", &["Billing"], 10);
        let a = entity_id("src/billing.py", &scope);
        let b = entity_id("./src//billing.py", &scope);
        assert_eq!(a, b);
        assert_eq!(a.len(), ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_id_ignores_line_for_named_scopes() {
        let a = entity_id("a.py", &function_scope("f", &[], 1));
        let b = entity_id("a.py", &function_scope("f", &[], 40));
        assert_eq!(a, b);
    }

    #[test]
    fn test_id_distinguishes_path_kind_and_blocks() {
        let base = function_scope("f", &[], 1);
        let nested = function_scope("f", &["C"], 1);
        assert_ne!(entity_id("a.py", &base), entity_id("a.py", &nested));
        assert_ne!(entity_id("a.py", &base), entity_id("b.py", &base));

        let block = |line| ScopeRef {
            kind: ScopeKind::Block,
            name: "<block>".to_string(),
            path: vec!["f".to_string()],
            line,
            column: 1,
        };
        assert_ne!(entity_id("a.py", &block(3)), entity_id("a.py", &block(7)));
    }

    // ========================================================================
    // Build Tests
    // ========================================================================

    #[test]
    fn test_build_extracts_core_fields() {
        let scope = function_scope("charge", &["Billing"], 3);
        let entity = build(
            "src/billing.py",
            &scope,
            fields(json!({"domain": "billing", "description": "Charges cards", "x": 1})),
        );
        assert_eq!(entity.name, "charge");
        assert_eq!(entity.domain.as_deref(), Some("billing"));
        assert_eq!(entity.description.as_deref(), Some("Charges cards"));
        assert_eq!(entity.field("x"), Some(&json!(1)));
        assert_eq!(entity.location.to_string(), "src/billing.py:3:5");
    }

    #[test]
    fn test_build_name_fallbacks() {
        let file = build("pkg/app.py", &ScopeRef::file(), BTreeMap::new());
        assert_eq!(file.name, "app.py");

        let named = build(
            "pkg/app.py",
            &ScopeRef::file(),
            fields(json!({"name": "Web App"})),
        );
        assert_eq!(named.name, "Web App");
    }

    // ========================================================================
    // Relationship Tests
    // ========================================================================

    #[test]
    fn test_declared_relationships() {
        let entity = build(
            "app.py",
            &ScopeRef::file(),
            fields(json!({
                "domain": "auth",
                "dependencies": ["database.py", "auth_client.py", "database.py"],
                "requires": "cache",
                "serviceBoundary": {"teamOwner": "Auth Team"}
            })),
        );
        let rels = declared_relationships(&entity, &RelationshipFields::default());
        let summary: Vec<(RelationshipKind, &str)> =
            rels.iter().map(|r| (r.kind, r.declared.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (RelationshipKind::Dependency, "database.py"),
                (RelationshipKind::Dependency, "auth_client.py"),
                (RelationshipKind::Dependency, "cache"),
                (RelationshipKind::Ownership, "Auth Team"),
                (RelationshipKind::DomainMembership, "auth"),
            ]
        );
        assert!(rels.iter().all(|r| r.from == entity.id));
        assert!(rels[0].is_dangling());
        assert!(!rels[3].is_dangling());
    }

    #[test]
    fn test_typed_relationship_fields() {
        let entity = build(
            "orders/api.py",
            &ScopeRef {
                kind: ScopeKind::Class,
                name: "OrderApi".to_string(),
                path: vec![],
                line: 4,
                column: 7,
            },
            fields(json!({
                "inherits": "BaseApi",
                "interfaces": ["Handler"],
                "uses_functions": ["audit"],
                "serviceBoundary": {"service": "OrderService"}
            })),
        );
        let rels = declared_relationships(&entity, &RelationshipFields::default());
        let summary: Vec<(RelationshipKind, &str)> =
            rels.iter().map(|r| (r.kind, r.declared.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (RelationshipKind::Extends, "BaseApi"),
                (RelationshipKind::Implements, "Handler"),
                (RelationshipKind::Calls, "audit"),
                (RelationshipKind::ServiceMembership, "OrderService"),
            ]
        );
        assert!(rels.iter().all(|r| !r.is_dangling()));
        assert!(!RelationshipKind::ServiceMembership.targets_entity());
        assert!(RelationshipKind::Calls.targets_entity());
    }

    #[test]
    fn test_object_dependencies() {
        let entity = build(
            "a.ts",
            &ScopeRef::file(),
            fields(json!({"depends_on": [{"name": "PaymentGateway"}, {"version": 2}, 7]})),
        );
        let rels = declared_relationships(&entity, &RelationshipFields::default());
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].to, EdgeTarget::Name("PaymentGateway".to_string()));
    }
}
