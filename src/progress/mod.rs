//! Coverage/progress engine
//!
//! Computes, per subtree root, how many attributable resources carry a
//! manual attribution, only unresolved external signals, or nothing at
//! all. Post-order aggregation with two twists:
//!
//! - a child that is an attribution breakpoint contributes its whole
//!   subtree collapsed to a single unit, so a vendored dependency that was
//!   attributed as a unit does not outweigh the rest of the tree
//! - a file-with-children counts itself once by its own leaf attribution
//!   state, independent of its children's state
//!
//! Summaries are memoized per node; a mutation invalidates only the
//! changed paths and their ancestor chains, so recomputation touches
//! O(depth) nodes instead of the whole tree. The asynchronous side
//! (dedicated thread, stale-result discard) lives in [`worker`].

pub mod worker;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::model::index::AttributionIndex;
use crate::model::resources::{chain_to_root, join_path, ResourceNode, ResourceTree};
use crate::model::AttributionId;
use crate::policy::TreePolicy;

// ─── Summary ───────────────────────────────────────────────────────

/// Aggregate attribution coverage of one subtree. The three category
/// counts partition `total_count`: every attributable resource is either
/// manually attributed, carries only unresolved external signals, or is
/// unassigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total_count: usize,
    pub manual_count: usize,
    pub external_only_unresolved_count: usize,
    pub unassigned_count: usize,
}

impl ProgressSummary {
    pub fn add(&mut self, other: ProgressSummary) {
        self.total_count += other.total_count;
        self.manual_count += other.manual_count;
        self.external_only_unresolved_count += other.external_only_unresolved_count;
        self.unassigned_count += other.unassigned_count;
    }

    /// Collapse a breakpoint subtree to a single unit, classified by the
    /// strongest state present below it. An empty subtree stays empty —
    /// a unit only exists if something attributable lives below.
    pub fn collapsed(self) -> ProgressSummary {
        if self.total_count == 0 {
            return ProgressSummary::default();
        }
        let mut unit = ProgressSummary {
            total_count: 1,
            ..Default::default()
        };
        if self.manual_count > 0 {
            unit.manual_count = 1;
        } else if self.external_only_unresolved_count > 0 {
            unit.external_only_unresolved_count = 1;
        } else {
            unit.unassigned_count = 1;
        }
        unit
    }

    pub fn is_partitioned(&self) -> bool {
        self.total_count
            == self.manual_count + self.external_only_unresolved_count + self.unassigned_count
    }
}

// ─── Inputs ────────────────────────────────────────────────────────

/// Borrowed view of everything the aggregation reads. Pure inputs: the
/// same inputs always produce the same summary.
pub struct CoverageInputs<'a> {
    pub tree: &'a ResourceTree,
    pub manual: &'a AttributionIndex,
    pub external: &'a AttributionIndex,
    pub resolved: &'a HashSet<AttributionId>,
    pub policy: &'a TreePolicy,
}

impl CoverageInputs<'_> {
    fn classify(&self, path: &str) -> ProgressSummary {
        let mut unit = ProgressSummary {
            total_count: 1,
            ..Default::default()
        };
        if !self.manual.attributions_for(path).is_empty() {
            unit.manual_count = 1;
        } else if self
            .external
            .attributions_for(path)
            .iter()
            .any(|id| !self.resolved.contains(id))
        {
            unit.external_only_unresolved_count = 1;
        } else {
            unit.unassigned_count = 1;
        }
        unit
    }
}

// ─── Memoized computation ──────────────────────────────────────────

/// Per-node summary memo. Stores uncollapsed summaries; breakpoint
/// collapsing happens where a child contributes to its parent, so a query
/// rooted at a breakpoint still reports the full subtree.
#[derive(Debug, Clone, Default)]
pub struct CoverageCache {
    summaries: HashMap<String, ProgressSummary>,
    hits: usize,
    misses: usize,
}

impl CoverageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the memo for a path and every ancestor up to the root.
    pub fn invalidate_chain(&mut self, path: &str) {
        for p in chain_to_root(path) {
            self.summaries.remove(&p);
        }
    }

    pub fn clear(&mut self) {
        self.summaries.clear();
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Coverage of the subtree rooted at `root`, memoized through `cache`.
/// `None` when the root path does not exist.
pub fn compute(
    inputs: &CoverageInputs<'_>,
    root: &str,
    cache: &mut CoverageCache,
) -> Option<ProgressSummary> {
    let node = inputs.tree.get(root)?;
    Some(summarize(inputs, root, node, cache))
}

/// Full-tree computation with the initial fan-out parallelized over the
/// root's children. Only worth it on seed; incremental recomputation is
/// already O(depth).
pub fn compute_full_parallel(inputs: &CoverageInputs<'_>) -> (ProgressSummary, CoverageCache) {
    use rayon::prelude::*;

    let root = crate::model::resources::ROOT_PATH;
    let Some(root_node) = inputs.tree.get(root) else {
        return (ProgressSummary::default(), CoverageCache::new());
    };

    let child_results: Vec<(String, ProgressSummary, CoverageCache)> = root_node
        .children
        .par_iter()
        .map(|name| {
            let path = join_path(root, name);
            let mut local = CoverageCache::new();
            let summary = inputs
                .tree
                .get(&path)
                .map(|node| summarize(inputs, &path, node, &mut local))
                .unwrap_or_default();
            (path, summary, local)
        })
        .collect();

    let mut cache = CoverageCache::new();
    let mut total = ProgressSummary::default();
    if root_node.attributable {
        total.add(inputs.classify(root));
    }
    for (path, summary, local) in child_results {
        let contribution = if inputs.policy.is_breakpoint(&path) {
            summary.collapsed()
        } else {
            summary
        };
        total.add(contribution);
        cache.summaries.extend(local.summaries);
    }
    cache.summaries.insert(root.to_string(), total);
    (total, cache)
}

fn summarize(
    inputs: &CoverageInputs<'_>,
    path: &str,
    node: &ResourceNode,
    cache: &mut CoverageCache,
) -> ProgressSummary {
    if let Some(summary) = cache.summaries.get(path) {
        cache.hits += 1;
        return *summary;
    }
    cache.misses += 1;

    let mut summary = ProgressSummary::default();
    if node.attributable {
        // Leaf, or file-with-children counted by its own state.
        summary.add(inputs.classify(path));
    }
    for name in &node.children {
        let child_path = join_path(path, name);
        let Some(child) = inputs.tree.get(&child_path) else {
            continue;
        };
        let child_summary = summarize(inputs, &child_path, child, cache);
        let contribution = if inputs.policy.is_breakpoint(&child_path) {
            child_summary.collapsed()
        } else {
            child_summary
        };
        summary.add(contribution);
    }

    cache.summaries.insert(path.to_string(), summary);
    summary
}
