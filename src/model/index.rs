//! Resource-to-attribution index — bidirectional path↔id mapping
//!
//! One index per attribution kind. The forward view (path → ordered id set)
//! and the reverse view (id → path set) are mutated together; a divergence
//! between them is a programming error, asserted in debug builds, never a
//! recoverable condition.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::resources::{canonical, ResourceTree};
use crate::model::{AttributionId, AttributionStore};
use crate::{MerkjaError, MerkjaResult};

/// Bidirectional mapping between resource paths and attribution ids for a
/// single attribution kind. Many resources may share one attribution; one
/// resource may carry many.
#[derive(Debug, Clone, Default)]
pub struct AttributionIndex {
    /// path → ids, in link order, deduplicated.
    forward: HashMap<String, Vec<AttributionId>>,
    reverse: HashMap<AttributionId, BTreeSet<String>>,
}

impl AttributionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the wholesale load input (path → id list).
    pub fn from_map(map: HashMap<String, Vec<AttributionId>>) -> Self {
        let mut index = Self::new();
        for (path, ids) in map {
            for id in ids {
                index.link(&path, id);
            }
        }
        index
    }

    /// Attribution ids linked to a path, in link order. Empty for unknown
    /// paths.
    pub fn attributions_for(&self, path: &str) -> &[AttributionId] {
        self.forward
            .get(canonical(path))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Paths linked to an attribution id. `None` for unknown ids.
    pub fn resources_for(&self, id: &AttributionId) -> Option<&BTreeSet<String>> {
        self.reverse.get(id)
    }

    pub fn is_linked(&self, path: &str, id: &AttributionId) -> bool {
        self.forward
            .get(canonical(path))
            .is_some_and(|ids| ids.contains(id))
    }

    /// Add an edge. Both views are updated together; linking an already
    /// linked pair is a no-op.
    pub fn link(&mut self, path: &str, id: AttributionId) {
        let path = canonical(path).to_string();
        let ids = self.forward.entry(path.clone()).or_default();
        if !ids.contains(&id) {
            ids.push(id.clone());
            self.reverse.entry(id).or_default().insert(path);
        }
        debug_assert!(self.views_consistent());
    }

    /// Remove an edge. Returns whether it existed. Empty forward/reverse
    /// entries are dropped so absence stays observable.
    pub fn unlink(&mut self, path: &str, id: &AttributionId) -> bool {
        let path = canonical(path);
        let Some(ids) = self.forward.get_mut(path) else {
            return false;
        };
        let Some(pos) = ids.iter().position(|x| x == id) else {
            return false;
        };
        ids.remove(pos);
        if ids.is_empty() {
            self.forward.remove(path);
        }
        if let Some(paths) = self.reverse.get_mut(id) {
            paths.remove(path);
            if paths.is_empty() {
                self.reverse.remove(id);
            }
        }
        debug_assert!(self.views_consistent());
        true
    }

    /// Remove every edge of an attribution id, returning the paths it was
    /// linked to. Used when an attribution is deleted outright.
    pub fn remove_id(&mut self, id: &AttributionId) -> Vec<String> {
        let Some(paths) = self.reverse.remove(id) else {
            return Vec::new();
        };
        for path in &paths {
            if let Some(ids) = self.forward.get_mut(path) {
                ids.retain(|x| x != id);
                if ids.is_empty() {
                    self.forward.remove(path);
                }
            }
        }
        debug_assert!(self.views_consistent());
        paths.into_iter().collect()
    }

    /// Paths that carry at least one edge.
    pub fn linked_paths(&self) -> impl Iterator<Item = &str> {
        self.forward.keys().map(String::as_str)
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(Vec::len).sum()
    }

    /// Load-time validation: every indexed id must exist in `store`, every
    /// indexed path in `tree`. A dangling reference is fatal to the load.
    pub fn validate(
        &self,
        store: &AttributionStore,
        tree: &ResourceTree,
        kind_label: &str,
    ) -> MerkjaResult<()> {
        for (path, ids) in &self.forward {
            if !tree.contains(path) {
                return Err(MerkjaError::Consistency(format!(
                    "{kind_label} index references unknown resource path {path}"
                )));
            }
            for id in ids {
                if !store.contains(id) {
                    return Err(MerkjaError::Consistency(format!(
                        "{kind_label} index references missing attribution {id} at {path}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Paths whose id set differs between `self` and `other`. Drives
    /// incremental coverage invalidation on the worker side.
    pub fn diff_paths(&self, other: &AttributionIndex) -> Vec<String> {
        let mut changed: HashSet<&str> = HashSet::new();
        for (path, ids) in &self.forward {
            if other.forward.get(path) != Some(ids) {
                changed.insert(path);
            }
        }
        for path in other.forward.keys() {
            if !self.forward.contains_key(path.as_str()) {
                changed.insert(path);
            }
        }
        changed.into_iter().map(str::to_string).collect()
    }

    fn views_consistent(&self) -> bool {
        self.forward.iter().all(|(path, ids)| {
            ids.iter().all(|id| {
                self.reverse
                    .get(id)
                    .is_some_and(|paths| paths.contains(path))
            })
        }) && self.reverse.iter().all(|(id, paths)| {
            paths.iter().all(|path| {
                self.forward
                    .get(path)
                    .is_some_and(|ids| ids.contains(id))
            })
        })
    }
}
