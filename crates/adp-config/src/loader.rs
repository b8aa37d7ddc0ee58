//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.adp/config.toml`
//! 2. Local config: `.adp/config.toml` (in workspace)
//! 3. CLI overrides
//!
//! Later sources override earlier ones.

use std::path::{Path, PathBuf};

use adp_core::{AssemblerConfig, RelationshipFields};
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::{AdpConfig, ConfigOverrides, LoggingConfig, ScanConfig, SchemaConfig};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".adp";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".adp";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.adp`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<AdpConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.adp`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a workspace.
    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a workspace with optional CLI overrides.
    ///
    /// Merges config in order: global → local → overrides, then validates.
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<AdpConfig, ConfigError> {
        let mut config = AdpConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(workspace_root)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load an explicit config file in place of the global and local layers.
    pub fn load_file(
        &self,
        path: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<AdpConfig, ConfigError> {
        debug!("Loading config from {:?}", path);
        let mut config = merge_configs(AdpConfig::default(), load_config_file(path)?);

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<AdpConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;

        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a workspace.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<AdpConfig>, ConfigError> {
        let local_path = self.local_config_path(workspace_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &AdpConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        let global_path = global_dir.join(CONFIG_FILE_NAME);
        save_config_file(&global_path, config)
    }

    /// Save configuration to the local config file for a workspace.
    pub fn save_local(&self, workspace_root: &Path, config: &AdpConfig) -> Result<(), ConfigError> {
        let local_path = self.local_config_path(workspace_root);
        save_config_file(&local_path, config)
    }

    /// Initialize global configuration directory.
    ///
    /// Creates `~/.adp/config.toml` with default configuration.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };
        init_config_dir(global_dir)
    }

    /// Initialize local configuration for a workspace.
    ///
    /// Creates `.adp/config.toml` with default configuration.
    pub fn init_local(&self, workspace_root: &Path) -> Result<PathBuf, ConfigError> {
        init_config_dir(&workspace_root.join(LOCAL_CONFIG_DIR))
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

fn init_config_dir(dir: &Path) -> Result<PathBuf, ConfigError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::create_dir(dir, e))?;
    }

    let config_path = dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        save_config_file(&config_path, &AdpConfig::default())?;
    }

    Ok(config_path)
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<AdpConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &AdpConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// This performs a field-by-field merge, allowing partial configs.
fn merge_configs(base: AdpConfig, overlay: AdpConfig) -> AdpConfig {
    AdpConfig {
        scan: merge_scan(base.scan, overlay.scan),
        schema: merge_schema(base.schema, overlay.schema),
        resolution: merge_resolution(base.resolution, overlay.resolution),
        relationships: merge_relationships(base.relationships, overlay.relationships),
        languages: {
            let mut langs = base.languages;
            langs.extend(overlay.languages);
            langs
        },
        logging: merge_logging(base.logging, overlay.logging),
    }
}

fn extend_unique(mut base: Vec<String>, overlay: Vec<String>) -> Vec<String> {
    for item in overlay {
        if !base.contains(&item) {
            base.push(item);
        }
    }
    base
}

/// Merge scan config, overlay values override base.
fn merge_scan(base: ScanConfig, overlay: ScanConfig) -> ScanConfig {
    let defaults = ScanConfig::default();
    ScanConfig {
        marker: if overlay.marker != defaults.marker {
            overlay.marker
        } else {
            base.marker
        },
        // A strict layer cannot be relaxed by a later default
        strict: overlay.strict || base.strict,
        // Overlay patterns extend base patterns
        exclude_patterns: extend_unique(base.exclude_patterns, overlay.exclude_patterns),
        max_file_size_kb: if overlay.max_file_size_kb != defaults.max_file_size_kb {
            overlay.max_file_size_kb
        } else {
            base.max_file_size_kb
        },
        parallelism: if overlay.parallelism != 0 {
            overlay.parallelism
        } else {
            base.parallelism
        },
        file_timeout_ms: if overlay.file_timeout_ms != 0 {
            overlay.file_timeout_ms
        } else {
            base.file_timeout_ms
        },
    }
}

/// Merge schema selection.
fn merge_schema(base: SchemaConfig, overlay: SchemaConfig) -> SchemaConfig {
    SchemaConfig {
        path: overlay.path.or(base.path),
        name: overlay.name.or(base.name),
    }
}

/// Merge resolution order; a non-default overlay order replaces the base.
fn merge_resolution(base: AssemblerConfig, overlay: AssemblerConfig) -> AssemblerConfig {
    if overlay != AssemblerConfig::default() {
        overlay
    } else {
        base
    }
}

/// Merge relationship field names; overlay names extend base names.
fn merge_relationships(base: RelationshipFields, overlay: RelationshipFields) -> RelationshipFields {
    RelationshipFields {
        dependencies: extend_unique(base.dependencies, overlay.dependencies),
        owners: extend_unique(base.owners, overlay.owners),
        extends: extend_unique(base.extends, overlay.extends),
        implements: extend_unique(base.implements, overlay.implements),
        calls: extend_unique(base.calls, overlay.calls),
        services: extend_unique(base.services, overlay.services),
    }
}

/// Merge logging config.
fn merge_logging(base: LoggingConfig, overlay: LoggingConfig) -> LoggingConfig {
    LoggingConfig {
        level: if overlay.level != "info" {
            overlay.level
        } else {
            base.level
        },
        format: overlay.format,
    }
}
