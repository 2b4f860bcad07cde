//! Raw configuration trees and their sources.
//!
//! The raw configuration is an untyped, nested mapping from string keys to
//! scalars, sequences, or further mappings, represented as a
//! [`serde_json::Value`] object. Each emission from a source replaces the
//! prior snapshot wholesale; emissions are compared by structural equality
//! to detect no-op re-emissions per path.
//!
//! This module provides the tree utilities (path access, leaf flattening,
//! deep merge) plus the sources that produce raw trees:
//!
//! - [`RawConfigSource`]: in-memory, push-based source used by embedders and
//!   tests
//! - [`ConfigLoader`]: multi-source loading (TOML files, environment
//!   variables, explicit overrides)
//! - [`FileConfigSource`]: a file-backed source with watch-driven reloads

pub mod file;
pub mod loader;
pub mod provider;

pub use file::{FileConfigSource, WatchSettings};
pub use loader::ConfigLoader;
pub use provider::{RawConfigProvider, RawConfigSource, RawSubscription};

use crate::path::ConfigPath;
use serde_json::{Map, Value};

/// Look up the subtree at `path`, or `None` if any segment is absent.
#[must_use]
pub fn get_at<'a>(tree: &'a Value, path: &ConfigPath) -> Option<&'a Value> {
    let mut current = tree;
    for segment in path.segments() {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set the value at `path`, creating intermediate objects as needed.
///
/// Non-object intermediates are replaced; setting at the empty path replaces
/// the whole tree.
pub fn set_at(tree: &mut Value, path: &ConfigPath, value: Value) {
    let segments = path.segments();
    let Some((last, parents)) = segments.split_last() else {
        *tree = value;
        return;
    };

    let mut current = tree;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        if let Value::Object(map) = current {
            current = map.entry(segment.clone()).or_insert_with(|| Value::Object(Map::new()));
        } else {
            return;
        }
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.clone(), value);
    }
}

/// Remove and return the value at `path`, if present.
pub fn unset_at(tree: &mut Value, path: &ConfigPath) -> Option<Value> {
    let segments = path.segments();
    let (last, parents) = segments.split_last()?;

    let mut current = tree;
    for segment in parents {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    current.as_object_mut()?.remove(last)
}

/// Enumerate every leaf path of the tree in dotted form.
///
/// A leaf is any non-object value (scalars and sequences); empty objects
/// contribute no leaves. Order follows the tree's key order.
#[must_use]
pub fn flatten_leaves(tree: &Value) -> Vec<String> {
    let mut leaves = Vec::new();
    collect_leaves(tree, String::new(), &mut leaves);
    leaves
}

fn collect_leaves(value: &Value, prefix: String, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_prefix = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_leaves(child, child_prefix, out);
            }
        },
        _ => {
            if !prefix.is_empty() {
                out.push(prefix);
            }
        },
    }
}

/// Deep-merge `overlay` into `base` and return the result.
///
/// Object values merge recursively; any other overlay value replaces the
/// base value at that key.
#[must_use]
pub fn merge(mut base: Value, overlay: Value) -> Value {
    merge_in_place(&mut base, overlay);
    base
}

fn merge_in_place(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_in_place(existing, value),
                    None => {
                        base_map.insert(key, value);
                    },
                }
            }
        },
        (base, overlay) => *base = overlay,
    }
}
