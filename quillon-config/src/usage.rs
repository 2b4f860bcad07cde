//! Used-versus-dangling path bookkeeping.

use crate::raw;
use serde_json::Value;
use std::collections::HashSet;

/// Records which leaf configuration paths have been consumed.
///
/// The used set grows monotonically for the tracker's lifetime; paths are
/// never un-used. First-use order is preserved so diagnostics are
/// reproducible across calls.
#[derive(Debug, Default)]
pub struct PathUsageTracker {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl PathUsageTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a dotted leaf path as consumed. Idempotent.
    pub fn mark_used(&mut self, path: &str) {
        if self.seen.insert(path.to_string()) {
            self.order.push(path.to_string());
        }
    }

    /// Every path ever marked used, in first-use order.
    #[must_use]
    pub fn used_paths(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Leaf paths present in `tree` that have never been marked used, in
    /// tree order.
    ///
    /// Recomputed on demand against the current tree; never cached, since
    /// the tree can change between emissions.
    #[must_use]
    pub fn unused_paths(&self, tree: &Value) -> Vec<String> {
        raw::flatten_leaves(tree)
            .into_iter()
            .filter(|leaf| !self.seen.contains(leaf))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn marking_is_idempotent_and_order_preserving() {
        let mut tracker = PathUsageTracker::new();
        tracker.mark_used("b.two");
        tracker.mark_used("a.one");
        tracker.mark_used("b.two");

        assert_eq!(tracker.used_paths(), vec!["b.two", "a.one"]);
    }

    #[test]
    fn unused_paths_are_the_tree_leaves_minus_the_used_set() {
        let tree = json!({
            "service": {"string": "str", "number": 42},
            "unknown": {"hello": "dolly", "number": 9000},
        });

        let mut tracker = PathUsageTracker::new();
        tracker.mark_used("service.string");
        tracker.mark_used("service.number");

        assert_eq!(tracker.unused_paths(&tree), vec!["unknown.hello", "unknown.number"]);
    }

    #[test]
    fn unused_paths_track_the_current_tree() {
        let tracker = PathUsageTracker::new();
        assert_eq!(tracker.unused_paths(&json!({"a": 1})), vec!["a"]);
        assert_eq!(tracker.unused_paths(&json!({"b": 2})), vec!["b"]);
    }
}
