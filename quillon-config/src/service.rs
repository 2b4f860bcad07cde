//! The configuration service.
//!
//! [`ConfigService`] composes the raw sources, schema registry, deprecation
//! engine and usage tracker into one orchestrator. It exposes:
//!
//! - a live validated value stream per path ([`at_path`])
//! - a synchronous last-known-valid accessor ([`at_path_sync`])
//! - an explicit one-shot validation pass across all registered schemas
//!   ([`validate`])
//! - introspection of used/unused paths and applied deprecations
//!
//! Data flows one direction at steady state: raw tree → deprecation pass →
//! per-path extraction → schema validation with the process context → typed
//! value delivered to subscribers. Every re-emission of the raw source runs
//! the same pipeline; subscribers receive only genuinely changed values.
//!
//! All computation is synchronous CPU work on the emitting thread. The
//! service owns its registry, tracker and snapshots exclusively; separate
//! service instances never share them.
//!
//! [`at_path`]: ConfigService::at_path
//! [`at_path_sync`]: ConfigService::at_path_sync
//! [`validate`]: ConfigService::validate
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use quillon_config::{
//!     ConfigService, Env, EnvOptions, PackageInfo, RawConfigSource,
//!     schema::StringSchema,
//! };
//!
//! # fn main() -> quillon_config::Result<()> {
//! let source = RawConfigSource::new(json!({"greeting": "hello"}));
//! let env = Env::new(
//!     "/opt/quillon",
//!     PackageInfo {
//!         version: "1.0.0".into(),
//!         branch: "main".into(),
//!         build_num: 1,
//!         build_sha: "abc".into(),
//!         dist: false,
//!     },
//!     EnvOptions::default(),
//! );
//!
//! let service = ConfigService::new(Arc::new(source.clone()), env);
//! service.set_schema("greeting", StringSchema::new())?;
//!
//! let subscription = service.at_path("greeting")?;
//! assert_eq!(*subscription.recv().unwrap()?, json!("hello"));
//!
//! source.push(json!({"greeting": "hej"}));
//! assert_eq!(*subscription.recv().unwrap()?, json!("hej"));
//! # Ok(())
//! # }
//! ```

use crate::deprecation::{
    ChangedPath, ConfigDeprecation, DeprecationEngine, DeprecationFactory, DeprecationLevel,
    DeprecationRecord,
};
use crate::env::{Env, SchemaContext};
use crate::error::{Error, Result};
use crate::path::ConfigPath;
use crate::raw::{self, RawConfigProvider, RawSubscription};
use crate::registry::SchemaRegistry;
use crate::schema::Schema;
use crate::usage::PathUsageTracker;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Options for [`ConfigService::validate_with`].
#[derive(Debug, Clone, Copy)]
pub struct ValidateOptions {
    /// Run the deprecation pass and forward non-silent records to the
    /// warning log. When `false` the pass is skipped entirely; no rewrites
    /// happen either.
    pub log_deprecations: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self { log_deprecations: true }
    }
}

struct PathChannel {
    /// Last value delivered for this path; `None` after an error so the
    /// next good value is always delivered.
    last: Option<Arc<Value>>,
    subscribers: Vec<(u64, Sender<Result<Arc<Value>>>)>,
}

struct ServiceState {
    raw: Arc<Value>,
    registry: SchemaRegistry,
    deprecations: DeprecationEngine,
    usage: PathUsageTracker,
    channels: HashMap<String, PathChannel>,
    snapshots: HashMap<String, Arc<Value>>,
    validated: bool,
    pass_deprecations: Vec<(String, Vec<DeprecationRecord>)>,
    enabled_deprecations: Vec<(String, Vec<DeprecationRecord>)>,
    last_changed_paths: Arc<Vec<ChangedPath>>,
    changed_subscribers: Vec<(u64, Sender<Arc<Vec<ChangedPath>>>)>,
    next_subscription_id: u64,
}

struct ServiceInner {
    env: Env,
    context: SchemaContext,
    state: RwLock<ServiceState>,
}

/// Typed, reactively-validated configuration service.
///
/// See the [module documentation](self) for the data flow. Shared state is
/// owned exclusively by the instance; clones of subscriptions may live on
/// other threads, but no external component mutates the registry, tracker
/// or snapshots directly.
pub struct ConfigService {
    inner: Arc<ServiceInner>,
    /// Keeps the raw source alive for the service's lifetime.
    _provider: Arc<dyn RawConfigProvider>,
    _raw_subscription: RawSubscription,
}

impl ConfigService {
    /// Create a service over a raw source and the process environment.
    ///
    /// The service subscribes to the source for its own lifetime; every
    /// emission re-runs the validation pipeline for live paths.
    pub fn new(provider: Arc<dyn RawConfigProvider>, env: Env) -> Self {
        let context = env.schema_context();
        let inner = Arc::new(ServiceInner {
            env,
            context,
            state: RwLock::new(ServiceState {
                raw: provider.current(),
                registry: SchemaRegistry::new(),
                deprecations: DeprecationEngine::new(),
                usage: PathUsageTracker::new(),
                channels: HashMap::new(),
                snapshots: HashMap::new(),
                validated: false,
                pass_deprecations: Vec::new(),
                enabled_deprecations: Vec::new(),
                last_changed_paths: Arc::new(Vec::new()),
                changed_subscribers: Vec::new(),
                next_subscription_id: 0,
            }),
        });

        let weak = Arc::downgrade(&inner);
        let raw_subscription = provider.subscribe(Box::new(move |tree| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_raw(tree);
            }
        }));

        Self { inner, _provider: provider, _raw_subscription: raw_subscription }
    }

    /// The process environment this service was created with.
    #[must_use]
    pub fn env(&self) -> &Env {
        &self.inner.env
    }

    /// Register `schema` for `path`.
    ///
    /// Fails if `path` already has a schema. Registration marks every leaf
    /// the schema statically declares as handled, except the reserved
    /// `enabled` leaf, which [`is_enabled_at_path`] tracks on read.
    ///
    /// [`is_enabled_at_path`]: ConfigService::is_enabled_at_path
    pub fn set_schema(&self, path: impl Into<ConfigPath>, schema: impl Into<Schema>) -> Result<()> {
        let path = path.into();
        let schema = schema.into();
        let mut guard = self.inner.state.write();
        let state = &mut *guard;

        let leaves = schema.known_leaves();
        state.registry.set(path.clone(), schema)?;
        debug!("Registered validation schema for [{path}]");

        for leaf in leaves {
            if leaf == "enabled" {
                continue;
            }
            if leaf.is_empty() {
                state.usage.mark_used(&path.to_string());
            } else {
                state.usage.mark_used(&format!("{path}.{leaf}"));
            }
        }
        Ok(())
    }

    /// Subscribe to the live validated value at `path`.
    ///
    /// The current value is delivered immediately; afterwards each raw
    /// emission that genuinely changes the validated value delivers a new
    /// one. A value failing validation is delivered as an `Err` item without
    /// terminating the subscription or affecting sibling paths.
    pub fn at_path(&self, path: impl Into<ConfigPath>) -> Result<ConfigSubscription> {
        let path = path.into();
        let mut guard = self.inner.state.write();
        let state = &mut *guard;

        let Some(schema) = state.registry.get(&path) else {
            return Err(Error::SchemaMissing { path });
        };

        let migrated = state.deprecations.apply(state.raw.as_ref()).config;
        let result = validate_at(&migrated, &path, schema, &self.inner.context);
        if result.is_ok() {
            mark_used_leaves(&mut state.usage, &migrated, &path);
        }

        let (sender, receiver) = crossbeam_channel::unbounded();
        let initial = result.map(Arc::new);
        let _ = sender.send(initial.clone());

        let id = state.next_subscription_id;
        state.next_subscription_id += 1;
        let channel = state
            .channels
            .entry(path.to_string())
            .or_insert_with(|| PathChannel { last: None, subscribers: Vec::new() });
        channel.last = initial.ok();
        channel.subscribers.push((id, sender));

        Ok(ConfigSubscription { path, id, receiver, service: Arc::downgrade(&self.inner) })
    }

    /// The value last captured for `path` by the validation pipeline.
    ///
    /// Fails until [`validate`](ConfigService::validate) has run once.
    /// Afterwards the snapshot tracks every processed raw emission; a
    /// failing re-validation leaves the last good value in place.
    pub fn at_path_sync(&self, path: impl Into<ConfigPath>) -> Result<Arc<Value>> {
        let path = path.into();
        let state = self.inner.state.read();
        if !state.validated {
            return Err(Error::NotYetValidated);
        }
        if let Some(snapshot) = state.snapshots.get(&path.to_string()) {
            return Ok(Arc::clone(snapshot));
        }
        if state.registry.contains(&path) {
            // Registered but never successfully validated.
            Err(Error::NotYetValidated)
        } else {
            Err(Error::SchemaMissing { path })
        }
    }

    /// Resolve the `enabled` flag under `path`.
    ///
    /// Resolution order: a registered schema that declares `enabled` wins;
    /// otherwise an explicit raw value is used directly (and recorded as a
    /// deprecated way of disabling, since nothing validates it); otherwise
    /// the path is enabled.
    ///
    /// `<path>.enabled` is always marked used. A disabled path additionally
    /// marks its whole subtree used; the configuration under it is
    /// intentionally ignored, not dangling.
    pub fn is_enabled_at_path(&self, path: impl Into<ConfigPath>) -> Result<bool> {
        let path = path.into();
        let mut guard = self.inner.state.write();
        let state = &mut *guard;

        let migrated = state.deprecations.apply(state.raw.as_ref()).config;
        let enabled_path = path.join("enabled");

        // A registered schema that declares `enabled` wins over the raw
        // value.
        let from_schema = match state.registry.get(&path) {
            Some(schema)
                if schema.as_object().is_some_and(|object| object.has_field("enabled")) =>
            {
                let value = validate_at(&migrated, &path, schema, &self.inner.context)?;
                Some(value.get("enabled").and_then(Value::as_bool).unwrap_or(true))
            },
            _ => None,
        };

        let enabled = if let Some(enabled) = from_schema {
            enabled
        } else if let Some(raw_enabled) = raw::get_at(&migrated, &enabled_path) {
            let enabled = raw_enabled.as_bool().unwrap_or(true);
            record_unknown_enabled(state, &path);
            enabled
        } else {
            true
        };

        state.usage.mark_used(&enabled_path.to_string());
        if !enabled {
            mark_used_leaves(&mut state.usage, &migrated, &path);
        }
        Ok(enabled)
    }

    /// Every leaf path ever consumed, in first-use order.
    #[must_use]
    pub fn used_paths(&self) -> Vec<String> {
        self.inner.state.read().usage.used_paths()
    }

    /// Leaf paths of the current tree that nothing has consumed.
    #[must_use]
    pub fn unused_paths(&self) -> Vec<String> {
        let state = self.inner.state.read();
        let migrated = state.deprecations.apply(state.raw.as_ref()).config;
        state.usage.unused_paths(&migrated)
    }

    /// Register a deprecation provider scoped to `path`.
    pub fn add_deprecation_provider<F>(&self, path: impl Into<ConfigPath>, provider: F)
    where
        F: Fn(&DeprecationFactory) -> Vec<ConfigDeprecation> + Send + Sync + 'static,
    {
        self.inner.state.write().deprecations.add_provider(path.into(), Box::new(provider));
    }

    /// Run one full validation pass with default options.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(ValidateOptions::default())
    }

    /// Run one full validation pass.
    ///
    /// Applies the deprecation pass (unless disabled), then validates every
    /// registered path in registration order, failing fast on the first
    /// error. Paths validated before the failure keep their updated
    /// snapshots; the failing path's snapshot stays at its last good value.
    pub fn validate_with(&self, options: ValidateOptions) -> Result<()> {
        let mut guard = self.inner.state.write();
        let state = &mut *guard;

        let migrated = if options.log_deprecations {
            let pass = state.deprecations.apply(state.raw.as_ref());
            for (_, records) in &pass.records {
                for record in records {
                    if !record.silent {
                        warn!("{}", record.message);
                    }
                }
            }
            state.pass_deprecations = pass.records;

            let changed = Arc::new(pass.changed_paths);
            state.last_changed_paths = Arc::clone(&changed);
            for (_, sender) in &state.changed_subscribers {
                let _ = sender.send(Arc::clone(&changed));
            }
            pass.config
        } else {
            state.raw.as_ref().clone()
        };

        state.validated = true;

        let results: Vec<(ConfigPath, Result<Value>)> = state
            .registry
            .iter()
            .map(|(path, schema)| {
                (path.clone(), validate_at(&migrated, path, schema, &self.inner.context))
            })
            .collect();

        for (path, result) in results {
            match result {
                Ok(value) => {
                    state.snapshots.insert(path.to_string(), Arc::new(value));
                    mark_used_leaves(&mut state.usage, &migrated, &path);
                },
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    /// Deprecation records from the most recent pass, grouped by the path
    /// whose rules produced them, plus records for deprecated `enabled`
    /// reads.
    #[must_use]
    pub fn handled_deprecated_configs(&self) -> Vec<(String, Vec<DeprecationRecord>)> {
        let state = self.inner.state.read();
        let mut merged = state.pass_deprecations.clone();
        for (path, records) in &state.enabled_deprecations {
            match merged.iter_mut().find(|(existing, _)| existing == path) {
                Some((_, group)) => group.extend(records.iter().cloned()),
                None => merged.push((path.clone(), records.clone())),
            }
        }
        merged
    }

    /// Subscribe to the `ChangedPath` sets produced by deprecation passes.
    ///
    /// The latest set is delivered immediately (empty before the first
    /// pass), then one per completed pass.
    #[must_use]
    pub fn deprecated_config_paths(&self) -> ChangedPathsSubscription {
        let mut guard = self.inner.state.write();
        let state = &mut *guard;

        let (sender, receiver) = crossbeam_channel::unbounded();
        let _ = sender.send(Arc::clone(&state.last_changed_paths));

        let id = state.next_subscription_id;
        state.next_subscription_id += 1;
        state.changed_subscribers.push((id, sender));

        ChangedPathsSubscription { id, receiver, service: Arc::downgrade(&self.inner) }
    }
}

impl std::fmt::Debug for ConfigService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("ConfigService")
            .field("schemas", &state.registry.len())
            .field("validated", &state.validated)
            .finish()
    }
}

impl ServiceInner {
    /// Process one raw emission: rewrite deprecations, re-validate every
    /// path with a consumer, refresh snapshots, and deliver genuinely
    /// changed values.
    fn handle_raw(&self, tree: Arc<Value>) {
        let mut guard = self.state.write();
        let state = &mut *guard;

        state.raw = Arc::clone(&tree);
        let migrated = state.deprecations.apply(tree.as_ref()).config;

        // Every path with a consumer: live subscriptions always, snapshot
        // paths once the first validate() has run. Each validates once per
        // emission.
        let mut targets: Vec<String> = state.channels.keys().cloned().collect();
        if state.validated {
            for (path, _) in state.registry.iter() {
                let key = path.to_string();
                if !targets.contains(&key) {
                    targets.push(key);
                }
            }
        }

        for key in targets {
            let path = ConfigPath::from(key.as_str());
            let Some(schema) = state.registry.get(&path) else {
                continue;
            };

            match validate_at(&migrated, &path, schema, &self.context) {
                Ok(value) => {
                    mark_used_leaves(&mut state.usage, &migrated, &path);
                    let value = Arc::new(value);
                    if state.validated {
                        state.snapshots.insert(key.clone(), Arc::clone(&value));
                    }
                    if let Some(channel) = state.channels.get_mut(&key) {
                        let unchanged =
                            channel.last.as_ref().is_some_and(|last| **last == *value);
                        if !unchanged {
                            channel.last = Some(Arc::clone(&value));
                            for (_, sender) in &channel.subscribers {
                                let _ = sender.send(Ok(Arc::clone(&value)));
                            }
                        }
                    }
                },
                Err(error) => {
                    // Snapshot stays at its last good value; subscribers see
                    // the failure without the stream terminating.
                    if let Some(channel) = state.channels.get_mut(&key) {
                        channel.last = None;
                        for (_, sender) in &channel.subscribers {
                            let _ = sender.send(Err(error.clone()));
                        }
                    }
                },
            }
        }
    }
}

fn validate_at(
    migrated: &Value,
    path: &ConfigPath,
    schema: &Schema,
    context: &SchemaContext,
) -> Result<Value> {
    schema
        .validate(raw::get_at(migrated, path), context)
        .map_err(|error| Error::Validation { path: path.clone(), detail: error.to_string() })
}

/// Mark the raw leaves under `path` as consumed.
fn mark_used_leaves(usage: &mut PathUsageTracker, migrated: &Value, path: &ConfigPath) {
    let Some(subtree) = raw::get_at(migrated, path) else {
        return;
    };
    if subtree.is_object() {
        for leaf in raw::flatten_leaves(subtree) {
            usage.mark_used(&format!("{path}.{leaf}"));
        }
    } else {
        usage.mark_used(&path.to_string());
    }
}

/// Record (once per path) that an `enabled` flag is configured without any
/// schema validating it.
fn record_unknown_enabled(state: &mut ServiceState, path: &ConfigPath) {
    let key = path.to_string();
    if state.enabled_deprecations.iter().any(|(existing, _)| *existing == key) {
        return;
    }

    let enabled_path = format!("{key}.enabled");
    let record = DeprecationRecord {
        level: DeprecationLevel::Critical,
        title: Some(format!("Setting \"{enabled_path}\" is deprecated")),
        message: format!(
            "Configuring \"{enabled_path}\" is deprecated and will be removed in the next major \
             version."
        ),
        manual_steps: vec![format!(
            "Remove \"{enabled_path}\" from the Quillon config file, CLI flag, or environment \
             variable before upgrading to the next major version."
        )],
        documentation_url: None,
        silent: false,
    };
    warn!("{}", record.message);
    state.enabled_deprecations.push((key, vec![record]));
}

/// Live sequence of validated values for one path.
///
/// Items are `Result`s: a raw emission that fails validation for this path
/// arrives as an `Err` without closing the stream. Dropping the subscription
/// detaches it; other subscribers and the raw-source subscription are
/// unaffected.
pub struct ConfigSubscription {
    path: ConfigPath,
    id: u64,
    receiver: Receiver<Result<Arc<Value>>>,
    service: Weak<ServiceInner>,
}

impl ConfigSubscription {
    /// The path this subscription observes.
    #[must_use]
    pub fn path(&self) -> &ConfigPath {
        &self.path
    }

    /// Block until the next item, or `None` once the service is gone.
    pub fn recv(&self) -> Option<Result<Arc<Value>>> {
        self.receiver.recv().ok()
    }

    /// The next item if one is already queued.
    pub fn try_recv(&self) -> Option<Result<Arc<Value>>> {
        self.receiver.try_recv().ok()
    }

    /// Receive the next item and deserialize it into `T`.
    pub fn recv_into<T: DeserializeOwned>(&self) -> Option<Result<T>> {
        self.recv().map(|item| {
            item.and_then(|value| {
                serde_json::from_value((*value).clone()).map_err(|error| Error::Validation {
                    path: self.path.clone(),
                    detail: error.to_string(),
                })
            })
        })
    }
}

impl Drop for ConfigSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.service.upgrade() {
            let mut guard = inner.state.write();
            let key = self.path.to_string();
            if let Some(channel) = guard.channels.get_mut(&key) {
                channel.subscribers.retain(|(id, _)| *id != self.id);
                if channel.subscribers.is_empty() {
                    guard.channels.remove(&key);
                }
            }
        }
    }
}

impl std::fmt::Debug for ConfigSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSubscription").field("path", &self.path).finish()
    }
}

/// Live sequence of the `ChangedPath` sets produced by deprecation passes.
pub struct ChangedPathsSubscription {
    id: u64,
    receiver: Receiver<Arc<Vec<ChangedPath>>>,
    service: Weak<ServiceInner>,
}

impl ChangedPathsSubscription {
    /// Block until the next set, or `None` once the service is gone.
    pub fn recv(&self) -> Option<Arc<Vec<ChangedPath>>> {
        self.receiver.recv().ok()
    }

    /// The next set if one is already queued.
    pub fn try_recv(&self) -> Option<Arc<Vec<ChangedPath>>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for ChangedPathsSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.service.upgrade() {
            inner.state.write().changed_subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for ChangedPathsSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangedPathsSubscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvOptions, PackageInfo};
    use crate::raw::RawConfigSource;
    use crate::schema::{NumberSchema, StringSchema};
    use serde_json::json;

    fn test_env() -> Env {
        Env::new(
            "/quillon",
            PackageInfo {
                version: "8.0.0".to_string(),
                branch: "master".to_string(),
                build_num: 42,
                build_sha: "one".to_string(),
                dist: false,
            },
            EnvOptions::default(),
        )
    }

    fn service_over(raw: Value) -> (RawConfigSource, ConfigService) {
        let source = RawConfigSource::new(raw);
        let service = ConfigService::new(Arc::new(source.clone()), test_env());
        (source, service)
    }

    #[test]
    fn failing_revalidation_leaves_the_snapshot_stale() {
        let (source, service) = service_over(json!({"key": "good"}));
        service.set_schema("key", StringSchema::new()).unwrap();
        service.validate().unwrap();

        assert_eq!(*service.at_path_sync("key").unwrap(), json!("good"));

        source.push(json!({"key": 123}));
        assert_eq!(*service.at_path_sync("key").unwrap(), json!("good"));

        source.push(json!({"key": "recovered"}));
        assert_eq!(*service.at_path_sync("key").unwrap(), json!("recovered"));
    }

    #[test]
    fn a_failing_path_does_not_disturb_sibling_snapshots() {
        let (source, service) = service_over(json!({"a": "one", "b": 2}));
        service.set_schema("a", StringSchema::new()).unwrap();
        service.set_schema("b", NumberSchema::new()).unwrap();
        service.validate().unwrap();

        source.push(json!({"a": 123, "b": 3}));

        assert_eq!(*service.at_path_sync("a").unwrap(), json!("one"));
        assert_eq!(*service.at_path_sync("b").unwrap(), json!(3));
    }

    #[test]
    fn dropping_a_subscription_detaches_it() {
        let (source, service) = service_over(json!({"key": "a"}));
        service.set_schema("key", StringSchema::new()).unwrap();

        let first = service.at_path("key").unwrap();
        let second = service.at_path("key").unwrap();
        assert!(first.try_recv().is_some());
        assert!(second.try_recv().is_some());

        drop(first);
        source.push(json!({"key": "b"}));

        assert_eq!(*second.try_recv().unwrap().unwrap(), json!("b"));
    }

    #[test]
    fn recv_into_deserializes_validated_values() {
        let (_source, service) = service_over(json!({"port": 7878}));
        service.set_schema("port", NumberSchema::new()).unwrap();

        let subscription = service.at_path("port").unwrap();
        let port: u16 = subscription.recv_into().unwrap().unwrap();
        assert_eq!(port, 7878);
    }
}
