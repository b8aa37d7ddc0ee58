//! ADP Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.adp/config.toml`
//! - Local config: `.adp/config.toml` (in workspace)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.
//!
//! Also loads schema documents (YAML, JSON or TOML) into a read-only
//! [`SchemaRegistry`] and ships the built-in default schema.

mod error;
mod loader;
mod schemas;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schemas::{
    default_schema, load_schema_file, parse_schema_document, SchemaFormat, SchemaRegistry,
    DEFAULT_SCHEMA_NAME,
};

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use adp_core::scan::DEFAULT_MAX_FILE_BYTES;
use adp_core::{
    AssemblerConfig, LanguageProfile, LanguageRegistry, RelationshipFields, ScanOptions, Schema,
    ValidationMode, DEFAULT_MARKER,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Root configuration for adp.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AdpConfig {
    /// Scan settings
    pub scan: ScanConfig,

    /// Which schema validates payloads
    pub schema: SchemaConfig,

    /// Dependency resolution order
    pub resolution: AssemblerConfig,

    /// Field names that declare relationships
    pub relationships: RelationshipFields,

    /// Custom language profiles keyed by name
    pub languages: BTreeMap<String, LanguageProfile>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scan configuration.
///
/// # Example TOML
///
/// ```toml
/// [scan]
/// marker = "@ai-metadata"
/// strict = false
/// exclude_patterns = ["**/generated/**"]
/// max_file_size_kb = 2048
/// parallelism = 0
/// file_timeout_ms = 0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Token that introduces a payload inside a comment
    pub marker: String,

    /// Report undeclared fields and fail the run on warnings
    pub strict: bool,

    /// Glob patterns excluded from directory walks
    pub exclude_patterns: Vec<String>,

    /// Maximum file size to scan (in KB, 0 = no limit)
    pub max_file_size_kb: u64,

    /// Number of parallel workers (0 = auto)
    pub parallelism: usize,

    /// Per-file time budget in milliseconds (0 = none)
    pub file_timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            strict: false,
            exclude_patterns: Vec::new(),
            max_file_size_kb: DEFAULT_MAX_FILE_BYTES / 1024,
            parallelism: 0,
            file_timeout_ms: 0,
        }
    }
}

/// Schema selection.
///
/// `path` is loaded and registered first; `name` then picks the schema used
/// for the run (defaults to the loaded file's schema, else the built-in one).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct SchemaConfig {
    /// Schema document (relative paths resolve against the workspace root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Registered schema name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// CLI overrides for configuration values.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override the annotation marker
    pub marker: Option<String>,

    /// Override strict mode
    pub strict: Option<bool>,

    /// Override the schema document path
    pub schema_path: Option<PathBuf>,

    /// Override the schema name
    pub schema_name: Option<String>,

    /// Override log level
    pub log_level: Option<String>,

    /// Override parallelism
    pub parallelism: Option<usize>,

    /// Additional exclude patterns
    pub exclude_patterns: Vec<String>,
}

impl AdpConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref marker) = overrides.marker {
            self.scan.marker = marker.clone();
        }

        if let Some(strict) = overrides.strict {
            self.scan.strict = strict;
        }

        if let Some(ref path) = overrides.schema_path {
            self.schema.path = Some(path.clone());
        }

        if let Some(ref name) = overrides.schema_name {
            self.schema.name = Some(name.clone());
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }

        if let Some(parallelism) = overrides.parallelism {
            self.scan.parallelism = parallelism;
        }

        for pattern in &overrides.exclude_patterns {
            if !self.scan.exclude_patterns.contains(pattern) {
                self.scan.exclude_patterns.push(pattern.clone());
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.marker.trim().is_empty() {
            return Err(ConfigError::invalid_value("scan.marker", "must not be empty"));
        }

        if self.resolution.strategies.is_empty() {
            return Err(ConfigError::invalid_value(
                "resolution.strategies",
                "at least one match strategy is required",
            ));
        }
        let mut seen = HashSet::new();
        for strategy in &self.resolution.strategies {
            if !seen.insert(strategy) {
                return Err(ConfigError::invalid_value(
                    "resolution.strategies",
                    format!("'{}' is listed more than once", strategy),
                ));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "logging.level",
                format!(
                    "unknown level '{}'. Valid values: {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            ));
        }

        for (name, profile) in &self.languages {
            let key = format!("languages.{}", name);
            if profile.extensions.is_empty() {
                return Err(ConfigError::invalid_value(key, "no file extensions"));
            }
            if !profile.has_comments() {
                return Err(ConfigError::invalid_value(key, "no comment syntax"));
            }
        }

        Ok(())
    }

    pub fn validation_mode(&self) -> ValidationMode {
        if self.scan.strict {
            ValidationMode::Strict
        } else {
            ValidationMode::Lenient
        }
    }

    /// Scan options for the engine.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            marker: self.scan.marker.clone(),
            mode: self.validation_mode(),
            relationships: self.relationships.clone(),
            assembler: self.resolution.clone(),
            max_file_bytes: self.scan.max_file_size_kb.saturating_mul(1024),
            file_timeout: (self.scan.file_timeout_ms > 0)
                .then(|| Duration::from_millis(self.scan.file_timeout_ms)),
            parallelism: self.scan.parallelism,
            excludes: self.scan.exclude_patterns.clone(),
        }
    }

    /// Builtin language profiles plus the configured ones.
    ///
    /// A configured profile without a name takes its table key.
    pub fn language_registry(&self) -> LanguageRegistry {
        let mut registry = LanguageRegistry::with_builtins();
        for (name, profile) in &self.languages {
            let mut profile = profile.clone();
            if profile.name.is_empty() {
                profile.name = name.clone();
            }
            debug!(
                "Registering language profile '{}' for {:?}",
                profile.name, profile.extensions
            );
            registry.register(profile);
        }
        registry
    }

    /// Configured schema file, resolved against the workspace root.
    pub fn schema_path(&self, workspace_root: &Path) -> Option<PathBuf> {
        self.schema.path.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                workspace_root.join(path)
            }
        })
    }

    /// Registry holding the default schema and the configured schema file.
    pub fn schema_registry(&self, workspace_root: &Path) -> Result<SchemaRegistry, ConfigError> {
        let mut registry = SchemaRegistry::with_default()?;
        if let Some(path) = self.schema_path(workspace_root) {
            registry.load_file(&path)?;
        }
        Ok(registry)
    }

    /// The schema this configuration selects for a run.
    pub fn load_schema(&self, workspace_root: &Path) -> Result<Arc<Schema>, ConfigError> {
        let mut registry = SchemaRegistry::with_default()?;
        let loaded = self
            .schema_path(workspace_root)
            .map(|path| registry.load_file(&path))
            .transpose()?;

        match (&self.schema.name, loaded) {
            (Some(name), _) => registry.get(name),
            (None, Some(schema)) => Ok(schema),
            (None, None) => registry.get(DEFAULT_SCHEMA_NAME),
        }
    }
}
