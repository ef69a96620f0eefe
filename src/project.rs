//! Audit session — the single logical owner of the project state
//!
//! All mutations to the tree, the stores, and the indexes are serialized
//! through this type; the coverage worker only ever sees snapshots and
//! deltas. Every mutation bumps a revision token so derived data can tell
//! whether it is still trustworthy.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::guard::{FileRequest, NavigationGuard, NavigationOutcome, StagedDestination, View};
use crate::model::index::AttributionIndex;
use crate::model::resources::{ResourceInput, ResourceTree, ROOT_PATH};
use crate::model::{AttributionId, AttributionKind, AttributionStore, PackageInfo};
use crate::policy::TreePolicy;
use crate::progress::worker::{CoverageSeed, CoverageWorker};
use crate::progress::ProgressSummary;
use crate::view::{self, VisibleRow};
use crate::{MerkjaError, MerkjaResult};

// ─── Load input ────────────────────────────────────────────────────

/// Wholesale project input as handed over by the import layer: the full
/// resource tree, both attribution collections and their resource
/// mappings, the resolved set, and the two policy sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectSnapshot {
    pub resources: ResourceInput,
    pub manual_attributions: HashMap<String, PackageInfo>,
    pub external_attributions: HashMap<String, PackageInfo>,
    pub resources_to_manual_attributions: HashMap<String, Vec<String>>,
    pub resources_to_external_attributions: HashMap<String, Vec<String>>,
    pub resolved_external_attributions: HashSet<String>,
    pub attribution_breakpoints: HashSet<String>,
    pub files_with_children: HashSet<String>,
}

impl ProjectSnapshot {
    pub fn from_json_file(path: &Path) -> MerkjaResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

// ─── Session ───────────────────────────────────────────────────────

/// Owner of one loaded project. Constructed per load; replaced wholesale
/// on the next load/merge.
#[derive(Debug)]
pub struct AuditSession {
    tree: ResourceTree,
    manual_store: AttributionStore,
    external_store: AttributionStore,
    manual_index: AttributionIndex,
    external_index: AttributionIndex,
    resolved: HashSet<AttributionId>,
    policy: TreePolicy,
    guard: NavigationGuard,
    expanded_ids: Vec<String>,
    worker: CoverageWorker,
    revision: u64,
    coverage: Option<ProgressSummary>,
}

impl AuditSession {
    /// Build a session from a wholesale snapshot. Consistency validation
    /// is fatal here: an index referencing a missing attribution or an
    /// unknown tree path aborts the load so no data is silently dropped.
    pub fn load(snapshot: ProjectSnapshot) -> MerkjaResult<Self> {
        let tree = ResourceTree::from_input(&snapshot.resources, &snapshot.files_with_children);
        let policy = TreePolicy::new(
            snapshot.attribution_breakpoints,
            snapshot.files_with_children,
        );

        let manual_store = store_from(snapshot.manual_attributions);
        let external_store = store_from(snapshot.external_attributions);
        let manual_index = index_from(snapshot.resources_to_manual_attributions);
        let external_index = index_from(snapshot.resources_to_external_attributions);

        manual_index.validate(&manual_store, &tree, "manual")?;
        external_index.validate(&external_store, &tree, "external")?;

        let resolved: HashSet<AttributionId> = snapshot
            .resolved_external_attributions
            .into_iter()
            .map(AttributionId::new)
            .collect();

        let mut worker = CoverageWorker::spawn(CoverageSeed {
            tree: tree.clone(),
            external: external_index.clone(),
            policy: policy.clone(),
        });
        worker.request(ROOT_PATH, manual_index.clone(), resolved.clone(), vec![]);

        tracing::info!(
            nodes = tree.node_count(),
            manual = manual_store.len(),
            external = external_store.len(),
            "project loaded"
        );

        Ok(Self {
            tree,
            manual_store,
            external_store,
            manual_index,
            external_index,
            resolved,
            policy,
            guard: NavigationGuard::new(),
            expanded_ids: vec![ROOT_PATH.to_string()],
            worker,
            revision: 0,
            coverage: None,
        })
    }

    /// Replace all state with a new snapshot (load/merge). The current
    /// session is kept untouched when the new snapshot fails validation.
    pub fn replace(&mut self, snapshot: ProjectSnapshot) -> MerkjaResult<()> {
        *self = Self::load(snapshot)?;
        Ok(())
    }

    // ── Read surface ───────────────────────────────────────────────

    pub fn tree(&self) -> &ResourceTree {
        &self.tree
    }

    pub fn policy(&self) -> &TreePolicy {
        &self.policy
    }

    pub fn guard(&self) -> &NavigationGuard {
        &self.guard
    }

    /// Change token: derived data computed at an older revision is stale.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn attributions_for(&self, path: &str, kind: AttributionKind) -> &[AttributionId] {
        self.index(kind).attributions_for(path)
    }

    pub fn resources_for(&self, id: &AttributionId, kind: AttributionKind) -> Vec<String> {
        self.index(kind)
            .resources_for(id)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn attribution(&self, id: &AttributionId, kind: AttributionKind) -> Option<&PackageInfo> {
        self.store(kind).get(id)
    }

    pub fn is_resolved(&self, id: &AttributionId) -> bool {
        self.resolved.contains(id)
    }

    // ── Edit commit ────────────────────────────────────────────────

    /// Commit an attribution edit. The four argument combinations:
    /// create-and-link (`Some`, `None`), update-in-place for every
    /// referencing resource (`None`, `Some`), update-and-keep-link
    /// (`Some`, `Some`), and create-unlinked (`None`, `None`). Returns
    /// the id of the written attribution.
    pub fn save_attribution(
        &mut self,
        resource_path: Option<&str>,
        attribution_id: Option<&AttributionId>,
        fields: PackageInfo,
    ) -> MerkjaResult<AttributionId> {
        if let Some(path) = resource_path {
            if !self.tree.contains(path) {
                return Err(MerkjaError::Consistency(format!(
                    "edit commit targets unknown resource path {path}"
                )));
            }
        }

        let mut changed_paths: Vec<String> = Vec::new();
        let id = match attribution_id {
            Some(id) => {
                if !self.manual_store.contains(id) {
                    return Err(MerkjaError::Consistency(format!(
                        "edit commit targets missing attribution {id}"
                    )));
                }
                if let Some(paths) = self.manual_index.resources_for(id) {
                    changed_paths.extend(paths.iter().cloned());
                }
                self.manual_store.upsert(id.clone(), fields);
                id.clone()
            }
            None => {
                let id = AttributionId::generate();
                self.manual_store.upsert(id.clone(), fields);
                id
            }
        };
        if let Some(path) = resource_path {
            self.manual_index.link(path, id.clone());
            changed_paths.push(crate::model::resources::canonical(path).to_string());
        }

        self.guard.mark_saved();
        let trigger = resource_path.unwrap_or(ROOT_PATH).to_string();
        self.touch(&trigger, changed_paths);
        Ok(id)
    }

    /// Detach a manual attribution from one resource. Absence (unknown
    /// edge) is a value, not an error.
    pub fn unlink_attribution(&mut self, path: &str, id: &AttributionId) -> bool {
        if !self.manual_index.unlink(path, id) {
            return false;
        }
        self.touch(path, vec![crate::model::resources::canonical(path).to_string()]);
        true
    }

    /// Delete a manual attribution outright, removing every index edge.
    pub fn delete_attribution(&mut self, id: &AttributionId) -> Option<PackageInfo> {
        let removed = self.manual_store.remove(id)?;
        let changed = self.manual_index.remove_id(id);
        let trigger = changed.first().cloned().unwrap_or_else(|| ROOT_PATH.to_string());
        self.touch(&trigger, changed);
        Some(removed)
    }

    /// Toggle the resolved (dismissed) flag of an external attribution.
    /// `None` when the id is unknown; `Some(new_state)` otherwise.
    pub fn toggle_resolved(&mut self, id: &AttributionId) -> Option<bool> {
        if !self.external_store.contains(id) {
            return None;
        }
        let now_resolved = if self.resolved.remove(id) {
            false
        } else {
            self.resolved.insert(id.clone());
            true
        };
        let changed = self.resources_for(id, AttributionKind::External);
        let trigger = changed.first().cloned().unwrap_or_else(|| ROOT_PATH.to_string());
        self.touch(&trigger, changed);
        Some(now_resolved)
    }

    // ── Coverage ───────────────────────────────────────────────────

    /// Apply any fresh coverage result and return the latest summary.
    /// Superseded results never surface here.
    pub fn coverage(&mut self) -> Option<ProgressSummary> {
        if let Some(result) = self.worker.poll() {
            self.coverage = Some(result.summary);
        }
        self.coverage
    }

    /// Block until the most recently requested recomputation lands. Meant
    /// for tests and the initial load; interactive callers poll instead.
    pub fn wait_for_coverage(&mut self, timeout: Duration) -> Option<ProgressSummary> {
        let target = self.worker.last_issued_seq();
        if let Some(result) = self.worker.wait_for(target, timeout) {
            self.coverage = Some(result.summary);
        }
        self.coverage
    }

    // ── Presentation ───────────────────────────────────────────────

    pub fn expanded_ids(&self) -> &[String] {
        &self.expanded_ids
    }

    pub fn visible_rows(&self) -> Vec<VisibleRow> {
        view::flatten_visible(&self.tree, &self.policy, &self.expanded_ids)
    }

    pub fn toggle_node(&mut self, node_id: &str) {
        view::toggle_expansion(&mut self.expanded_ids, &self.tree, &self.policy, node_id);
    }

    // ── Navigation (through the guard) ─────────────────────────────

    pub fn begin_edit(&mut self, draft: PackageInfo) {
        self.guard.begin_edit(draft);
    }

    /// Select a resource; while an edit is uncommitted this stages the
    /// destination instead. On application the path is revealed in the
    /// tree by expanding its ancestor chain.
    pub fn navigate_to_resource(&mut self, node_id: &str) -> NavigationOutcome {
        let outcome = self.guard.request_resource(node_id);
        if matches!(outcome, NavigationOutcome::Applied(_)) {
            self.reveal(node_id);
        }
        outcome
    }

    pub fn navigate_to_view(&mut self, view: View) -> NavigationOutcome {
        self.guard.request_view(view)
    }

    pub fn navigate_to_attribution(&mut self, id: &AttributionId) -> NavigationOutcome {
        self.guard.request_attribution(id.as_str())
    }

    pub fn request_file(&mut self, request: FileRequest) -> NavigationOutcome {
        self.guard.request_file(request)
    }

    /// Route an arbitrary multi-field destination through the guard.
    pub fn navigate(&mut self, destination: StagedDestination) -> NavigationOutcome {
        let resource = destination.resource_id.clone();
        let outcome = self.guard.request(destination);
        if matches!(outcome, NavigationOutcome::Applied(_)) {
            if let Some(path) = resource {
                self.reveal(&path);
            }
        }
        outcome
    }

    /// Discard the draft and apply the staged destination. The returned
    /// file request, if any, is the shell's to dispatch.
    pub fn confirm_discard(&mut self) -> Option<FileRequest> {
        let destination = self.guard.confirm_discard()?;
        if let Some(ref path) = destination.resource_id {
            self.reveal(path);
        }
        destination.file_request
    }

    pub fn cancel_navigation(&mut self) {
        self.guard.cancel();
    }

    // ── Internals ──────────────────────────────────────────────────

    fn index(&self, kind: AttributionKind) -> &AttributionIndex {
        match kind {
            AttributionKind::Manual => &self.manual_index,
            AttributionKind::External => &self.external_index,
        }
    }

    fn store(&self, kind: AttributionKind) -> &AttributionStore {
        match kind {
            AttributionKind::Manual => &self.manual_store,
            AttributionKind::External => &self.external_store,
        }
    }

    fn reveal(&mut self, path: &str) {
        for id in view::ancestor_ids(path) {
            if !self.expanded_ids.contains(&id) {
                self.expanded_ids.push(id);
            }
        }
    }

    /// Record a mutation: bump the change token and queue an incremental
    /// recomputation for the affected paths.
    fn touch(&mut self, trigger: &str, changed_paths: Vec<String>) {
        self.revision += 1;
        self.worker.request(
            trigger,
            self.manual_index.clone(),
            self.resolved.clone(),
            changed_paths,
        );
    }
}

fn store_from(records: HashMap<String, PackageInfo>) -> AttributionStore {
    AttributionStore::from_records(
        records
            .into_iter()
            .map(|(id, info)| (AttributionId::new(id), info))
            .collect(),
    )
}

fn index_from(map: HashMap<String, Vec<String>>) -> AttributionIndex {
    AttributionIndex::from_map(
        map.into_iter()
            .map(|(path, ids)| (path, ids.into_iter().map(AttributionId::new).collect()))
            .collect(),
    )
}
