//! Per-path schema registration.

use crate::error::{Error, Result};
use crate::path::ConfigPath;
use crate::schema::Schema;
use std::collections::HashMap;

/// Mapping from configuration path to validation schema.
///
/// Registration order is preserved: the explicit validation pass visits
/// schemas in the order they were registered, and its fail-fast error is the
/// first failing path in that order. Each path may be registered exactly
/// once; a second registration is a programmer error.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entries: Vec<(ConfigPath, Schema)>,
    index: HashMap<String, usize>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `schema` for `path`.
    ///
    /// Registration only records capability; it does not read or validate
    /// the raw value.
    pub fn set(&mut self, path: ConfigPath, schema: Schema) -> Result<()> {
        let key = path.to_string();
        if self.index.contains_key(&key) {
            return Err(Error::SchemaAlreadyRegistered { path });
        }
        self.index.insert(key, self.entries.len());
        self.entries.push((path, schema));
        Ok(())
    }

    /// Look up the schema registered for `path`.
    #[must_use]
    pub fn get(&self, path: &ConfigPath) -> Option<&Schema> {
        let index = *self.index.get(&path.to_string())?;
        self.entries.get(index).map(|(_, schema)| schema)
    }

    /// Whether a schema is registered for `path`.
    #[must_use]
    pub fn contains(&self, path: &ConfigPath) -> bool {
        self.index.contains_key(&path.to_string())
    }

    /// Iterate registered entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&ConfigPath, &Schema)> {
        self.entries.iter().map(|(path, schema)| (path, schema))
    }

    /// Number of registered schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no schema has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StringSchema;

    #[test]
    fn second_registration_for_the_same_path_fails() {
        let mut registry = SchemaRegistry::new();
        registry.set(ConfigPath::from("key"), StringSchema::new().into()).unwrap();

        let error = registry.set(ConfigPath::from("key"), StringSchema::new().into()).unwrap_err();
        assert_eq!(error.to_string(), "Validation schema for [key] was already registered.");
    }

    #[test]
    fn iteration_preserves_registration_order() {
        let mut registry = SchemaRegistry::new();
        registry.set(ConfigPath::from("b"), StringSchema::new().into()).unwrap();
        registry.set(ConfigPath::from("a"), StringSchema::new().into()).unwrap();

        let order: Vec<String> = registry.iter().map(|(path, _)| path.to_string()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn lookup_by_equivalent_path_forms() {
        let mut registry = SchemaRegistry::new();
        registry.set(ConfigPath::from("a.b"), StringSchema::new().into()).unwrap();
        assert!(registry.contains(&ConfigPath::from(["a", "b"])));
    }
}
