//! Schema documents and the named schema registry.
//!
//! Schema files are YAML, JSON or TOML renderings of
//! [`adp_core::SchemaDocument`], picked by file extension. The registry is
//! filled before a scan starts and only read afterwards; scans share each
//! schema through an `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use adp_core::{Schema, SchemaDocument};
use tracing::debug;

use crate::error::ConfigError;

/// Name of the built-in schema.
pub const DEFAULT_SCHEMA_NAME: &str = "default";

const DEFAULT_SCHEMA_YAML: &str = include_str!("../schemas/default.yaml");

/// Serialization format of a schema document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    Yaml,
    Json,
    Toml,
}

impl SchemaFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }

    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    /// Render a document in this format.
    pub fn render(&self, document: &SchemaDocument) -> Result<String, ConfigError> {
        match self {
            Self::Yaml => {
                serde_yaml::to_string(document).map_err(|e| ConfigError::RenderSchema(e.to_string()))
            }
            Self::Json => serde_json::to_string_pretty(document)
                .map_err(|e| ConfigError::RenderSchema(e.to_string())),
            Self::Toml => Ok(toml::to_string_pretty(document)?),
        }
    }
}

impl fmt::Display for SchemaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SchemaFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            _ => Err(ConfigError::invalid_value(
                "format",
                format!("unknown schema format '{}'. Valid values: yaml, json, toml", s),
            )),
        }
    }
}

/// Parse a document from text. `origin` is only used in error messages.
pub fn parse_schema_document(
    text: &str,
    format: SchemaFormat,
    origin: &Path,
) -> Result<SchemaDocument, ConfigError> {
    match format {
        SchemaFormat::Yaml => {
            serde_yaml::from_str(text).map_err(|e| ConfigError::parse_schema(origin, e))
        }
        SchemaFormat::Json => {
            serde_json::from_str(text).map_err(|e| ConfigError::parse_schema(origin, e))
        }
        SchemaFormat::Toml => toml::from_str(text).map_err(|e| ConfigError::parse_schema(origin, e)),
    }
}

fn into_schema(document: SchemaDocument) -> Result<Schema, ConfigError> {
    let name = document.name.clone();
    document
        .into_schema()
        .map_err(|source| ConfigError::InvalidSchema { name, source })
}

/// Read, parse and check a schema file.
pub fn load_schema_file(path: &Path) -> Result<Schema, ConfigError> {
    let format = SchemaFormat::from_path(path).ok_or_else(|| {
        ConfigError::UnsupportedSchemaFormat {
            path: path.to_path_buf(),
        }
    })?;
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let schema = into_schema(parse_schema_document(&text, format, path)?)?;
    debug!(
        "Loaded schema {} ({} fields) from {:?}",
        schema.label(),
        schema.fields.len(),
        path
    );
    Ok(schema)
}

/// The schema shipped with adp.
pub fn default_schema() -> Result<Schema, ConfigError> {
    let origin = PathBuf::from("<builtin>/default.yaml");
    into_schema(parse_schema_document(
        DEFAULT_SCHEMA_YAML,
        SchemaFormat::Yaml,
        &origin,
    )?)
}

// ============================================================================
// Registry
// ============================================================================

/// Named schemas available to a run.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in default schema.
    pub fn with_default() -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        registry.register(default_schema()?);
        Ok(registry)
    }

    /// Add a schema under its own name, replacing any previous one.
    pub fn register(&mut self, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        if self
            .schemas
            .insert(schema.name.clone(), Arc::clone(&schema))
            .is_some()
        {
            debug!("Replaced schema '{}'", schema.name);
        }
        schema
    }

    /// Load a schema file and register it.
    pub fn load_file(&mut self, path: &Path) -> Result<Arc<Schema>, ConfigError> {
        Ok(self.register(load_schema_file(path)?))
    }

    pub fn get(&self, name: &str) -> Result<Arc<Schema>, ConfigError> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::unknown_schema(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
