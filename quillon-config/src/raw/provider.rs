//! Live raw configuration sources.
//!
//! A [`RawConfigProvider`] supplies the current raw tree and multicasts
//! every replacement snapshot to registered observers. Delivery is
//! synchronous per emission: `push` returns after every observer has seen
//! the new tree, so a single emission is processed as one unit of work.

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Observer callback invoked with each replacement snapshot.
pub type RawObserver = Box<dyn Fn(Arc<Value>) + Send + Sync>;

/// A live, re-emitting source of the raw configuration tree.
///
/// Each emission replaces the prior snapshot wholesale (not a diff).
pub trait RawConfigProvider: Send + Sync {
    /// The latest raw tree snapshot.
    fn current(&self) -> Arc<Value>;

    /// Register an observer for subsequent emissions.
    ///
    /// The observer is not replayed the current snapshot; callers read
    /// [`current`](Self::current) first. Dropping the returned subscription
    /// detaches the observer without affecting others.
    fn subscribe(&self, observer: RawObserver) -> RawSubscription;
}

struct SourceInner {
    value: RwLock<Arc<Value>>,
    observers: RwLock<Vec<(u64, Arc<RawObserver>)>>,
    next_id: AtomicU64,
}

/// In-memory raw configuration source.
///
/// Holds the latest tree and synchronously multicasts every [`push`] to all
/// observers. This is the source embedders and tests drive directly; the
/// file-backed source wraps one internally.
///
/// [`push`]: RawConfigSource::push
#[derive(Clone)]
pub struct RawConfigSource {
    inner: Arc<SourceInner>,
}

impl RawConfigSource {
    /// Create a source holding `initial` as the current snapshot.
    #[must_use]
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                value: RwLock::new(Arc::new(initial)),
                observers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Create a source holding an empty tree.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Value::Object(Map::new()))
    }

    /// Replace the current snapshot and notify every observer.
    ///
    /// Observers run on the calling thread, in registration order, before
    /// `push` returns.
    pub fn push(&self, tree: Value) {
        let snapshot = Arc::new(tree);
        *self.inner.value.write() = Arc::clone(&snapshot);

        // Snapshot the observer list so callbacks run without the lock held.
        let observers: Vec<Arc<RawObserver>> =
            self.inner.observers.read().iter().map(|(_, observer)| Arc::clone(observer)).collect();
        for observer in observers {
            (*observer)(Arc::clone(&snapshot));
        }
    }
}

impl std::fmt::Debug for RawConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawConfigSource")
            .field("observers", &self.inner.observers.read().len())
            .finish()
    }
}

impl RawConfigProvider for RawConfigSource {
    fn current(&self) -> Arc<Value> {
        Arc::clone(&self.inner.value.read())
    }

    fn subscribe(&self, observer: RawObserver) -> RawSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.observers.write().push((id, Arc::new(observer)));
        RawSubscription { source: Arc::downgrade(&self.inner), id }
    }
}

/// Handle tying an observer registration to a scope.
///
/// Dropping the subscription detaches the observer; other observers and the
/// source itself are unaffected.
pub struct RawSubscription {
    source: Weak<SourceInner>,
    id: u64,
}

impl Drop for RawSubscription {
    fn drop(&mut self) {
        if let Some(source) = self.source.upgrade() {
            source.observers.write().retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for RawSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawSubscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn push_replaces_the_snapshot() {
        let source = RawConfigSource::new(json!({"key": "a"}));
        assert_eq!(*source.current(), json!({"key": "a"}));

        source.push(json!({"key": "b"}));
        assert_eq!(*source.current(), json!({"key": "b"}));
    }

    #[test]
    fn observers_see_each_emission_in_order() {
        let source = RawConfigSource::empty();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let _subscription = source.subscribe(Box::new(move |tree| {
            seen_clone.lock().unwrap().push((*tree).clone());
        }));

        source.push(json!({"n": 1}));
        source.push(json!({"n": 2}));

        assert_eq!(*seen.lock().unwrap(), vec![json!({"n": 1}), json!({"n": 2})]);
    }

    #[test]
    fn dropping_a_subscription_detaches_only_that_observer() {
        let source = RawConfigSource::empty();
        let first = Arc::new(Mutex::new(0u32));
        let second = Arc::new(Mutex::new(0u32));

        let first_clone = Arc::clone(&first);
        let subscription = source.subscribe(Box::new(move |_| {
            *first_clone.lock().unwrap() += 1;
        }));
        let second_clone = Arc::clone(&second);
        let _keep = source.subscribe(Box::new(move |_| {
            *second_clone.lock().unwrap() += 1;
        }));

        source.push(json!({"n": 1}));
        drop(subscription);
        source.push(json!({"n": 2}));

        assert_eq!(*first.lock().unwrap(), 1);
        assert_eq!(*second.lock().unwrap(), 2);
    }
}
