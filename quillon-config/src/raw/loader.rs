//! Raw configuration loading.
//!
//! Handles loading the raw tree from various sources (TOML files,
//! environment variables, and explicit overrides) with proper error
//! handling. The loader only assembles the tree; validation belongs to the
//! configuration service, which applies registered schemas on top of
//! whatever the loader produced.

use crate::error::{Error, Result};
use crate::path::ConfigPath;
use crate::raw;
use serde_json::{Map, Number, Value};
use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Raw configuration loader with support for multiple sources.
///
/// Precedence, lowest to highest: configuration file, environment
/// variables, explicit overrides.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
    env_prefix: String,
    overrides: Vec<(ConfigPath, Value)>,
}

impl ConfigLoader {
    /// Create a loader with the default search paths and the `QUILLON`
    /// environment prefix.
    #[must_use]
    pub fn new() -> Self {
        Self {
            search_paths: vec![
                PathBuf::from("."),
                PathBuf::from("./config"),
                dirs::config_dir().unwrap_or_else(|| PathBuf::from("/etc")),
            ],
            env_prefix: "QUILLON".to_string(),
            overrides: Vec::new(),
        }
    }

    /// Add a search path for configuration files.
    #[must_use]
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Set the environment variable prefix.
    #[must_use]
    pub fn with_env_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.env_prefix = prefix.as_ref().to_string();
        self
    }

    /// Force a value at a dotted path, applied after all other sources.
    /// Used for CLI-level `--config-override` style settings.
    #[must_use]
    pub fn with_override(mut self, path: impl Into<ConfigPath>, value: impl Into<Value>) -> Self {
        self.overrides.push((path.into(), value.into()));
        self
    }

    /// Load the raw tree from all available sources.
    pub fn load(&self) -> Result<Value> {
        let mut tree = Value::Object(Map::new());

        if let Some(config_path) = self.find_config_file() {
            let file_tree = self.load_config_file(&config_path)?;
            tree = raw::merge(tree, file_tree);
            info!("Loaded configuration file: {}", config_path.display());
        } else {
            debug!("No configuration file found in search paths");
        }

        tree = self.apply_env_vars(tree);
        debug!("Applied environment variables");

        for (path, value) in &self.overrides {
            raw::set_at(&mut tree, path, value.clone());
        }

        Ok(tree)
    }

    /// Load the raw tree from a specific file, then apply environment
    /// variables and overrides on top.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<Value> {
        let path = path.as_ref();
        debug!("Loading configuration from file: {}", path.display());

        let mut tree = self.load_config_file(path)?;
        tree = self.apply_env_vars(tree);
        for (override_path, value) in &self.overrides {
            raw::set_at(&mut tree, override_path, value.clone());
        }
        Ok(tree)
    }

    /// Find the first available configuration file.
    fn find_config_file(&self) -> Option<PathBuf> {
        let config_names = ["quillon.toml", "config.toml"];

        for search_path in &self.search_paths {
            for config_name in &config_names {
                let config_path = search_path.join(config_name);
                if config_path.exists() {
                    debug!("Found config file: {}", config_path.display());
                    return Some(config_path);
                }
            }
        }

        None
    }

    /// Parse a TOML file into a raw tree.
    fn load_config_file(&self, path: &Path) -> Result<Value> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Source {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let parsed = content.parse::<toml::Value>().map_err(|e| Error::Source {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(toml_to_json(parsed))
    }

    /// Apply prefixed environment variables on top of the tree.
    fn apply_env_vars(&self, mut tree: Value) -> Value {
        for (key, value) in self.collect_env_vars() {
            let path = ConfigPath::from(key);
            raw::set_at(&mut tree, &path, parse_env_value(&value));
        }
        tree
    }

    /// Collect all relevant environment variables, mapping
    /// `PREFIX_A_B=value` to the dotted path `a.b`.
    fn collect_env_vars(&self) -> HashMap<String, String> {
        let mut env_vars = HashMap::new();
        let prefix = format!("{}_", self.env_prefix);

        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(&prefix) {
                let config_key = stripped.to_lowercase().replace('_', ".");
                env_vars.insert(config_key, value);
            }
        }

        debug!("Collected {} environment variables", env_vars.len());
        env_vars
    }

    /// The effective search paths being used.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// The environment prefix being used.
    #[must_use]
    pub fn env_prefix(&self) -> &str {
        &self.env_prefix
    }

    /// Validate that at least one search path exists, returning the valid
    /// ones.
    pub fn validate_search_paths(&self) -> Result<Vec<PathBuf>> {
        let mut valid_paths = Vec::new();

        for path in &self.search_paths {
            if path.exists() {
                valid_paths.push(path.clone());
            } else {
                warn!("Search path does not exist: {}", path.display());
            }
        }

        if valid_paths.is_empty() {
            return Err(Error::Source {
                message: "No valid search paths found for configuration files".to_string(),
            });
        }

        Ok(valid_paths)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an environment variable value to the narrowest raw type.
fn parse_env_value(value: &str) -> Value {
    if let Ok(boolean) = value.parse::<bool>() {
        return Value::Bool(boolean);
    }
    if let Ok(integer) = value.parse::<i64>() {
        return Value::Number(Number::from(integer));
    }
    if let Some(float) = value.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(float);
    }
    Value::String(value.to_string())
}

/// Convert a parsed TOML document into the raw tree representation.
fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(Number::from(i)),
        toml::Value::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => {
            Value::Object(table.into_iter().map(|(k, v)| (k, toml_to_json(v))).collect())
        },
    }
}
