//! Versioned field schemas for annotation payloads.
//!
//! The engine never embeds a schema: callers build one in code or load a
//! [`SchemaDocument`] (YAML, JSON or TOML through serde) and convert it with
//! [`SchemaDocument::into_schema`], which checks kinds and sub-schema
//! references up front.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors in a schema document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unknown value kind `{kind}` for field `{field}`")]
    UnknownKind { field: String, kind: String },

    #[error("field `{field}` references undefined sub-schema `{schema}`")]
    UndefinedSubSchema { field: String, schema: String },

    #[error("field `{field}` declares `items` but is not an array")]
    ItemsOnScalar { field: String },

    #[error("schema has no name")]
    MissingName,
}

// ============================================================================
// Value Kinds
// ============================================================================

/// Kind of a value in a payload tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
    Any,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Integer => "integer",
            ValueKind::Boolean => "boolean",
            ValueKind::Object => "object",
            ValueKind::Array => "array",
            ValueKind::Null => "null",
            ValueKind::Any => "any",
        }
    }

    /// The most specific kind of `value`.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => ValueKind::Integer,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Whether `value` is acceptable for this kind. Integers are numbers.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueKind::Any => true,
            ValueKind::Number => value.is_number(),
            kind => *kind == Self::of(value),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" | "str" => Ok(ValueKind::String),
            "number" | "float" => Ok(ValueKind::Number),
            "integer" | "int" => Ok(ValueKind::Integer),
            "boolean" | "bool" => Ok(ValueKind::Boolean),
            "object" | "map" => Ok(ValueKind::Object),
            "array" | "list" => Ok(ValueKind::Array),
            "null" => Ok(ValueKind::Null),
            "any" => Ok(ValueKind::Any),
            other => Err(other.to_string()),
        }
    }
}

// ============================================================================
// Schema
// ============================================================================

/// One declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub kind: ValueKind,
    pub required: bool,
    /// Permitted values for scalars (and scalar array elements)
    pub allowed: Option<Vec<Value>>,
    /// Element kind for arrays
    pub items: Option<ValueKind>,
    /// Named sub-schema for objects, or for array elements
    pub schema: Option<String>,
    pub description: Option<String>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            allowed: None,
            items: None,
            schema: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn allowed<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn items(mut self, kind: ValueKind) -> Self {
        self.items = Some(kind);
        self
    }

    pub fn sub_schema(mut self, name: impl Into<String>) -> Self {
        self.schema = Some(name.into());
        self
    }
}

/// A named, versioned mapping from field name to [`SchemaField`].
///
/// Sub-schemas referenced by fields live in `definitions` of the root schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub fields: BTreeMap<String, SchemaField>,
    pub definitions: BTreeMap<String, Schema>,
}

impl Schema {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            fields: BTreeMap::new(),
            definitions: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: SchemaField) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn with_definition(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.definitions.insert(name.into(), schema);
        self
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.get(name)
    }

    pub fn definition(&self, name: &str) -> Option<&Schema> {
        self.definitions.get(name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.values().filter(|f| f.required)
    }

    /// `name@version`
    pub fn label(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Document form, for display and round-trips through config files.
    pub fn to_document(&self) -> SchemaDocument {
        SchemaDocument {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            fields: fields_to_documents(&self.fields),
            definitions: self
                .definitions
                .iter()
                .map(|(name, schema)| {
                    (
                        name.clone(),
                        DefinitionDocument {
                            description: schema.description.clone(),
                            fields: fields_to_documents(&schema.fields),
                        },
                    )
                })
                .collect(),
        }
    }
}

fn fields_to_documents(fields: &BTreeMap<String, SchemaField>) -> BTreeMap<String, FieldDocument> {
    fields
        .iter()
        .map(|(name, f)| {
            (
                name.clone(),
                FieldDocument {
                    kind: f.kind.as_str().to_string(),
                    required: f.required,
                    allowed: f.allowed.clone(),
                    items: f.items.map(|k| k.as_str().to_string()),
                    schema: f.schema.clone(),
                    description: f.description.clone(),
                },
            )
        })
        .collect()
}

// ============================================================================
// Schema Documents
// ============================================================================

fn default_version() -> String {
    "1".to_string()
}

/// Serializable form of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDocument>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub definitions: BTreeMap<String, DefinitionDocument>,
}

/// A named sub-schema inside a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDocument>,
}

/// Serializable form of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDocument {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, alias = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_kind() -> String {
    "any".to_string()
}

impl SchemaDocument {
    /// Check the document and convert it into a [`Schema`].
    pub fn into_schema(self) -> Result<Schema, SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::MissingName);
        }

        let mut definitions = BTreeMap::new();
        for (name, def) in &self.definitions {
            let mut sub = Schema::new(name.clone(), self.version.clone());
            sub.description = def.description.clone();
            sub.fields = convert_fields(&def.fields, name)?;
            definitions.insert(name.clone(), sub);
        }

        let fields = convert_fields(&self.fields, "")?;
        let schema = Schema {
            name: self.name,
            version: self.version,
            description: self.description,
            fields,
            definitions,
        };

        let all_fields = schema
            .fields
            .values()
            .map(|f| (String::new(), f))
            .chain(schema.definitions.iter().flat_map(|(def, sub)| {
                sub.fields.values().map(move |f| (format!("{def}."), f))
            }));
        for (prefix, field) in all_fields {
            if let Some(sub) = &field.schema {
                if !schema.definitions.contains_key(sub) {
                    return Err(SchemaError::UndefinedSubSchema {
                        field: format!("{prefix}{}", field.name),
                        schema: sub.clone(),
                    });
                }
            }
        }
        Ok(schema)
    }
}

fn convert_fields(
    fields: &BTreeMap<String, FieldDocument>,
    owner: &str,
) -> Result<BTreeMap<String, SchemaField>, SchemaError> {
    let qualified = |name: &str| {
        if owner.is_empty() {
            name.to_string()
        } else {
            format!("{owner}.{name}")
        }
    };
    let parse_kind = |name: &str, kind: &str| {
        kind.parse::<ValueKind>()
            .map_err(|kind| SchemaError::UnknownKind {
                field: qualified(name),
                kind,
            })
    };

    let mut out = BTreeMap::new();
    for (name, doc) in fields {
        let kind = parse_kind(name, &doc.kind)?;
        let items = doc
            .items
            .as_deref()
            .map(|k| parse_kind(name, k))
            .transpose()?;
        if items.is_some() && kind != ValueKind::Array {
            return Err(SchemaError::ItemsOnScalar {
                field: qualified(name),
            });
        }
        out.insert(
            name.clone(),
            SchemaField {
                name: name.clone(),
                kind,
                required: doc.required,
                allowed: doc.allowed.clone(),
                items,
                schema: doc.schema.clone(),
                description: doc.description.clone(),
            },
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn document(value: Value) -> SchemaDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_value_kind_matching() {
        assert!(ValueKind::Number.matches(&json!(3)));
        assert!(ValueKind::Number.matches(&json!(3.5)));
        assert!(ValueKind::Integer.matches(&json!(3)));
        assert!(!ValueKind::Integer.matches(&json!(3.5)));
        assert!(ValueKind::Any.matches(&json!(null)));
        assert!(!ValueKind::String.matches(&json!(["a"])));
        assert_eq!(ValueKind::of(&json!({"a": 1})), ValueKind::Object);
    }

    #[test]
    fn test_document_into_schema() {
        let schema = document(json!({
            "name": "core",
            "version": "2",
            "fields": {
                "description": {"type": "string", "required": true},
                "techDebt": {"type": "array", "schema": "debt"}
            },
            "definitions": {
                "debt": {
                    "fields": {
                        "severity": {"type": "string", "enum": ["low", "medium", "high"]}
                    }
                }
            }
        }))
        .into_schema()
        .unwrap();

        assert_eq!(schema.label(), "core@2");
        assert!(schema.field("description").unwrap().required);
        let severity = schema.definition("debt").unwrap().field("severity").unwrap();
        assert_eq!(
            severity.allowed,
            Some(vec![json!("low"), json!("medium"), json!("high")])
        );
        assert_eq!(schema.required_fields().count(), 1);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = document(json!({
            "name": "core",
            "fields": {"size": {"type": "decimal"}}
        }))
        .into_schema()
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownKind {
                field: "size".to_string(),
                kind: "decimal".to_string()
            }
        );
    }

    #[test]
    fn test_undefined_sub_schema_is_rejected() {
        let err = document(json!({
            "name": "core",
            "fields": {"performance": {"type": "array", "schema": "perf"}}
        }))
        .into_schema()
        .unwrap_err();
        assert!(matches!(err, SchemaError::UndefinedSubSchema { .. }));
    }

    #[test]
    fn test_items_on_scalar_is_rejected() {
        let err = document(json!({
            "name": "core",
            "fields": {"owner": {"type": "string", "items": "string"}}
        }))
        .into_schema()
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "field `owner` declares `items` but is not an array"
        );
    }

    #[test]
    fn test_document_round_trip() {
        let schema = Schema::new("core", "1")
            .with_field(SchemaField::new("domain", ValueKind::String).required())
            .with_field(SchemaField::new("tags", ValueKind::Array).items(ValueKind::String));
        let back = schema.to_document().into_schema().unwrap();
        assert_eq!(back, schema);
    }
}
