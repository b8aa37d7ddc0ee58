//! Schema Validator
//!
//! Checks a payload against a [`Schema`] field by field. A bad field never
//! rejects the whole payload: it is reported and dropped from the sanitized
//! output, and the rest survives. Unknown fields are always kept.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::extractor::AnnotationPayload;
use crate::schema::{Schema, SchemaField, ValueKind};

/// How undeclared fields are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Undeclared fields produce a warning
    Strict,
    /// Undeclared fields are accepted silently
    #[default]
    Lenient,
}

impl ValidationMode {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            ValidationMode::Strict
        } else {
            ValidationMode::Lenient
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Lenient => "lenient",
        }
    }
}

/// Sanitized fields plus everything found wrong with the payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validated {
    pub fields: BTreeMap<String, Value>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Validated {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Validate `payload` against `schema`.
///
/// `path` names the file used in diagnostics. Diagnostics point at the
/// offending top-level key when it can be located, otherwise at the marker.
pub fn validate(
    payload: &AnnotationPayload,
    schema: &Schema,
    mode: ValidationMode,
    path: &str,
) -> Validated {
    let Value::Object(map) = &payload.value else {
        let (line, column) = payload.marker_position();
        return Validated {
            fields: BTreeMap::new(),
            diagnostics: vec![Diagnostic::new(
                DiagnosticCode::ValidatorError,
                format!(
                    "payload must be an object, found {}",
                    ValueKind::of(&payload.value)
                ),
                path,
                line,
                column,
            )],
        };
    };

    let mut checker = Checker::new(schema, mode);
    let fields = checker.object(map, schema, "", None);
    let diagnostics = checker
        .findings
        .into_iter()
        .map(|finding| {
            let (line, column) = match &finding.anchor {
                Some(key) => payload.position_of(key),
                None => payload.marker_position(),
            };
            Diagnostic::new(finding.code, finding.message, path, line, column)
        })
        .collect();

    Validated {
        fields: fields.into_iter().collect(),
        diagnostics,
    }
}

// ============================================================================
// Checker
// ============================================================================

struct Finding {
    code: DiagnosticCode,
    message: String,
    /// Top-level key the finding belongs to
    anchor: Option<String>,
}

struct Checker<'s> {
    root: &'s Schema,
    mode: ValidationMode,
    findings: Vec<Finding>,
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

impl<'s> Checker<'s> {
    fn new(root: &'s Schema, mode: ValidationMode) -> Self {
        Self {
            root,
            mode,
            findings: Vec::new(),
        }
    }

    fn error(&mut self, anchor: Option<&str>, message: String) {
        self.findings.push(Finding {
            code: DiagnosticCode::ValidatorError,
            message,
            anchor: anchor.map(str::to_string),
        });
    }

    fn warning(&mut self, anchor: Option<&str>, message: String) {
        self.findings.push(Finding {
            code: DiagnosticCode::ValidatorWarning,
            message,
            anchor: anchor.map(str::to_string),
        });
    }

    /// Check an object against `schema`. `anchor` is the enclosing top-level
    /// key for nested objects.
    fn object(
        &mut self,
        map: &Map<String, Value>,
        schema: &Schema,
        prefix: &str,
        anchor: Option<&str>,
    ) -> Map<String, Value> {
        for field in schema.required_fields() {
            if !map.contains_key(&field.name) {
                self.error(
                    anchor,
                    format!("missing required field `{}`", join(prefix, &field.name)),
                );
            }
        }

        let mut out = Map::new();
        for (key, value) in map {
            let path = join(prefix, key);
            let anchor = anchor.or(Some(key.as_str()));
            match schema.field(key) {
                None => {
                    if self.mode == ValidationMode::Strict {
                        self.warning(
                            anchor,
                            format!(
                                "unknown field `{path}` is not declared in schema `{}`",
                                self.root.label()
                            ),
                        );
                    }
                    out.insert(key.clone(), value.clone());
                }
                Some(field) => {
                    if let Some(clean) = self.value(value, field, &path, anchor) {
                        out.insert(key.clone(), clean);
                    }
                }
            }
        }
        out
    }

    fn value(
        &mut self,
        value: &Value,
        field: &SchemaField,
        path: &str,
        anchor: Option<&str>,
    ) -> Option<Value> {
        if !field.kind.matches(value) {
            self.error(
                anchor,
                format!(
                    "field `{path}` expected {}, found {}",
                    field.kind,
                    ValueKind::of(value)
                ),
            );
            return None;
        }
        if let Some(allowed) = &field.allowed {
            if !value.is_array() && !allowed.contains(value) {
                self.error(
                    anchor,
                    format!("field `{path}` value {value} is not one of {}", list(allowed)),
                );
                return None;
            }
        }

        let root = self.root;
        let sub = field.schema.as_deref().and_then(|name| root.definition(name));
        match value {
            Value::Array(items) => Some(Value::Array(self.elements(items, field, sub, path, anchor))),
            Value::Object(map) => match sub {
                Some(sub) => Some(Value::Object(self.object(map, sub, path, anchor))),
                None => Some(value.clone()),
            },
            _ => Some(value.clone()),
        }
    }

    /// Keep valid array elements; report one error per dropped index.
    fn elements(
        &mut self,
        items: &[Value],
        field: &SchemaField,
        sub: Option<&Schema>,
        path: &str,
        anchor: Option<&str>,
    ) -> Vec<Value> {
        let mut kept = Vec::with_capacity(items.len());
        for (idx, elem) in items.iter().enumerate() {
            let reason = match (field.items, sub, elem) {
                (Some(kind), _, _) if !kind.matches(elem) => {
                    Some(format!("expected {kind}, found {}", ValueKind::of(elem)))
                }
                (_, Some(sub), Value::Object(map)) => {
                    let mut nested = Checker::new(self.root, self.mode);
                    let clean = nested.object(map, sub, &format!("{path}[{idx}]"), anchor);
                    let (errors, rest): (Vec<Finding>, Vec<Finding>) = nested
                        .findings
                        .into_iter()
                        .partition(|f| f.code == DiagnosticCode::ValidatorError);
                    self.findings.extend(rest);
                    if errors.is_empty() {
                        kept.push(Value::Object(clean));
                        continue;
                    }
                    Some(
                        errors
                            .into_iter()
                            .map(|f| f.message)
                            .collect::<Vec<_>>()
                            .join("; "),
                    )
                }
                (_, Some(_), other) => {
                    Some(format!("expected object, found {}", ValueKind::of(other)))
                }
                _ => match &field.allowed {
                    Some(allowed) if !allowed.contains(elem) => {
                        Some(format!("value {elem} is not one of {}", list(allowed)))
                    }
                    _ => None,
                },
            };

            match reason {
                Some(reason) => self.error(anchor, format!("{path}[{idx}] dropped: {reason}")),
                None => kept.push(elem.clone()),
            }
        }
        kept
    }
}

fn list(values: &[Value]) -> String {
    let items: Vec<String> = values.iter().map(Value::to_string).collect();
    format!("[{}]", items.join(", "))
}
