//! Deprecated-setting reconciliation.
//!
//! Deprecation rules transform and flag the raw configuration tree before
//! validation: a renamed setting is moved to its new path, an unused or
//! removed setting is dropped, and every rewrite produces a human-readable
//! record plus a [`ChangedPath`] entry describing what moved.
//!
//! The pass is a pure function of the tree: [`DeprecationEngine::apply`]
//! takes the current raw tree and returns the rewritten tree together with
//! the records and changed paths it produced, threading all state
//! explicitly. Rules run in registration order and are idempotent: a rule
//! keys off the presence of the deprecated setting, so re-applying a pass to
//! an already-migrated tree records nothing new.

use crate::path::ConfigPath;
use crate::raw;
use serde_json::Value;

/// Severity of a deprecation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeprecationLevel {
    /// The setting still works but should be migrated.
    Warning,
    /// The setting no longer has any effect.
    Critical,
}

/// A recorded deprecation, scoped to the path whose rules produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeprecationRecord {
    /// Severity of the deprecation.
    pub level: DeprecationLevel,
    /// Short heading suitable for a UI listing.
    pub title: Option<String>,
    /// Human-readable description of the deprecation.
    pub message: String,
    /// Manual steps the operator should take.
    pub manual_steps: Vec<String>,
    /// Link to further documentation.
    pub documentation_url: Option<String>,
    /// Silent records are queryable but never forwarded to the warning log
    /// (used for automatic migrations).
    pub silent: bool,
}

/// A deprecation-triggered rewrite of one setting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangedPath {
    /// CLI flag the rewrite originated from, where applicable.
    pub command_line_arg: Option<String>,
    /// Path that was removed or moved away from.
    pub old_path: Option<String>,
    /// Path the value moved to, for renames.
    pub new_path: Option<String>,
}

/// A single deprecation rule descriptor, scoped to the path its provider was
/// registered for.
#[derive(Debug, Clone)]
pub struct ConfigDeprecation {
    kind: DeprecationKind,
    silent: bool,
}

#[derive(Debug, Clone)]
enum DeprecationKind {
    Renamed { from: String, to: String },
    Unused { key: String },
    Removed { key: String },
}

impl ConfigDeprecation {
    /// Mark the rule silent: rewrites still happen and records are still
    /// queryable, but nothing is forwarded to the warning log.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// Helper constructors handed to deprecation providers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeprecationFactory;

impl DeprecationFactory {
    /// The setting at `from` moved to `to` (both relative to the provider's
    /// path). The value is carried over unless the new key is already set.
    #[must_use]
    pub fn renamed(&self, from: &str, to: &str) -> ConfigDeprecation {
        ConfigDeprecation {
            kind: DeprecationKind::Renamed { from: from.to_string(), to: to.to_string() },
            silent: false,
        }
    }

    /// The setting at `key` is read by nothing and is dropped from the tree.
    #[must_use]
    pub fn unused(&self, key: &str) -> ConfigDeprecation {
        ConfigDeprecation { kind: DeprecationKind::Unused { key: key.to_string() }, silent: false }
    }

    /// The setting at `key` was removed outright; configuring it is an
    /// operator error. The key is dropped so validation does not trip over
    /// it.
    #[must_use]
    pub fn removed(&self, key: &str) -> ConfigDeprecation {
        ConfigDeprecation { kind: DeprecationKind::Removed { key: key.to_string() }, silent: false }
    }
}

/// Provider callback producing rule descriptors for one path.
pub type DeprecationProvider =
    Box<dyn Fn(&DeprecationFactory) -> Vec<ConfigDeprecation> + Send + Sync>;

/// Result of one deprecation pass over a raw tree.
#[derive(Debug)]
pub struct DeprecationPass {
    /// The rewritten tree.
    pub config: Value,
    /// Records grouped by originating path, in first-record order.
    pub records: Vec<(String, Vec<DeprecationRecord>)>,
    /// Rewrites performed during this pass.
    pub changed_paths: Vec<ChangedPath>,
}

/// Ordered set of deprecation rules, scoped per path.
#[derive(Default)]
pub struct DeprecationEngine {
    providers: Vec<(ConfigPath, DeprecationProvider)>,
}

impl DeprecationEngine {
    /// Create an engine with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider whose rules are scoped to `path`. Multiple
    /// providers may target the same path; all run in registration order.
    pub fn add_provider(&mut self, path: ConfigPath, provider: DeprecationProvider) {
        self.providers.push((path, provider));
    }

    /// Whether any provider has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Run every rule against `tree`, returning the rewritten tree plus the
    /// records and changed paths produced by this pass.
    #[must_use]
    pub fn apply(&self, tree: &Value) -> DeprecationPass {
        let factory = DeprecationFactory;
        let mut config = tree.clone();
        let mut records: Vec<(String, Vec<DeprecationRecord>)> = Vec::new();
        let mut changed_paths = Vec::new();

        for (scope, provider) in &self.providers {
            let scope_key = scope.to_string();
            for rule in provider(&factory) {
                if let Some((record, changed)) = apply_rule(&mut config, scope, &rule) {
                    changed_paths.push(changed);
                    match records.iter_mut().find(|(path, _)| *path == scope_key) {
                        Some((_, group)) => group.push(record),
                        None => records.push((scope_key.clone(), vec![record])),
                    }
                }
            }
        }

        DeprecationPass { config, records, changed_paths }
    }
}

impl std::fmt::Debug for DeprecationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeprecationEngine").field("providers", &self.providers.len()).finish()
    }
}

fn apply_rule(
    config: &mut Value,
    scope: &ConfigPath,
    rule: &ConfigDeprecation,
) -> Option<(DeprecationRecord, ChangedPath)> {
    match &rule.kind {
        DeprecationKind::Renamed { from, to } => {
            let old_path = scoped(scope, from);
            let new_path = scoped(scope, to);
            let old_value = raw::unset_at(config, &old_path)?;

            let message;
            let manual_steps;
            if raw::get_at(config, &new_path).is_some() {
                message = format!(
                    "Setting \"{old_path}\" has been replaced by \"{new_path}\". However, both \
                     keys are present. Ignoring \"{old_path}\"."
                );
                manual_steps =
                    vec![format!("Remove \"{old_path}\" from the Quillon configuration.")];
            } else {
                raw::set_at(config, &new_path, old_value);
                message = format!("Setting \"{old_path}\" has been replaced by \"{new_path}\".");
                manual_steps = vec![format!(
                    "Replace \"{old_path}\" with \"{new_path}\" in the Quillon configuration."
                )];
            }

            Some((
                DeprecationRecord {
                    level: DeprecationLevel::Warning,
                    title: Some(format!("Setting \"{old_path}\" is deprecated")),
                    message,
                    manual_steps,
                    documentation_url: None,
                    silent: rule.silent,
                },
                ChangedPath {
                    command_line_arg: None,
                    old_path: Some(old_path.to_string()),
                    new_path: Some(new_path.to_string()),
                },
            ))
        },
        DeprecationKind::Unused { key } => {
            let path = scoped(scope, key);
            raw::unset_at(config, &path)?;
            Some((
                DeprecationRecord {
                    level: DeprecationLevel::Warning,
                    title: Some(format!("Setting \"{path}\" is deprecated")),
                    message: format!("You no longer need to configure \"{path}\"."),
                    manual_steps: vec![format!(
                        "Remove \"{path}\" from the Quillon configuration."
                    )],
                    documentation_url: None,
                    silent: rule.silent,
                },
                ChangedPath {
                    command_line_arg: None,
                    old_path: Some(path.to_string()),
                    new_path: None,
                },
            ))
        },
        DeprecationKind::Removed { key } => {
            let path = scoped(scope, key);
            raw::unset_at(config, &path)?;
            Some((
                DeprecationRecord {
                    level: DeprecationLevel::Critical,
                    title: Some(format!("Setting \"{path}\" has been removed")),
                    message: format!("Setting \"{path}\" has been removed and no longer has any \
                                      effect."),
                    manual_steps: vec![format!(
                        "Remove \"{path}\" from the Quillon configuration."
                    )],
                    documentation_url: None,
                    silent: rule.silent,
                },
                ChangedPath {
                    command_line_arg: None,
                    old_path: Some(path.to_string()),
                    new_path: None,
                },
            ))
        },
    }
}

fn scoped(scope: &ConfigPath, key: &str) -> ConfigPath {
    let mut path = scope.clone();
    for segment in key.split('.') {
        path = path.join(segment);
    }
    path
}
