//! Configuration error types.

use std::path::PathBuf;

use adp_core::SchemaError;
use thiserror::Error;

/// Errors that can occur while loading configuration or schema documents.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read a configuration or schema file
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("failed to parse config file '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Failed to serialize configuration
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Failed to write configuration file
    #[error("failed to write config file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create configuration directory
    #[error("failed to create config directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Home directory not found
    #[error("could not determine home directory")]
    NoHomeDir,

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Schema document could not be parsed
    #[error("failed to parse schema '{path}': {message}")]
    ParseSchema { path: PathBuf, message: String },

    /// Schema document parsed but is inconsistent
    #[error("invalid schema '{name}': {source}")]
    InvalidSchema {
        name: String,
        #[source]
        source: SchemaError,
    },

    /// Schema file extension is not yaml, yml, json or toml
    #[error("unsupported schema format '{path}' (expected .yaml, .yml, .json or .toml)")]
    UnsupportedSchemaFormat { path: PathBuf },

    /// Schema document could not be rendered
    #[error("failed to render schema: {0}")]
    RenderSchema(String),

    /// Schema name not present in the registry
    #[error("schema '{name}' not found in registry")]
    UnknownSchema { name: String },
}

impl ConfigError {
    /// Create a new ReadFile error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a new ParseToml error.
    pub fn parse_toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ParseToml {
            path: path.into(),
            source,
        }
    }

    /// Create a new WriteFile error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create a new CreateDir error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Create a new InvalidValue error.
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new ParseSchema error.
    pub fn parse_schema(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::ParseSchema {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a new UnknownSchema error.
    pub fn unknown_schema(name: impl Into<String>) -> Self {
        Self::UnknownSchema { name: name.into() }
    }
}
