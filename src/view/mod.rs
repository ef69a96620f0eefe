//! Tree presenter — ordered, lazily-expanded visible rows
//!
//! Produces the flattened row sequence an external view layer renders in a
//! virtualized list. Collapsed subtrees are never materialized. Everything
//! here is synchronous and pure: it reads an already-materialized tree
//! snapshot and completes within a single rendering pass.
//!
//! Node ids are full path strings; expandable nodes carry a trailing
//! separator, plain leaves do not. Selection, expansion membership, and
//! descendant-of-selected checks are all defined on this id format.

use std::collections::HashSet;

use crate::model::resources::{join_path, ResourceTree, ROOT_PATH};
use crate::policy::TreePolicy;

/// One renderable row. `depth` drives indentation; `node_id` is the
/// stable handle for selection and expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleRow {
    pub node_id: String,
    pub display_name: String,
    pub is_expandable: bool,
    pub is_expanded: bool,
    pub depth: usize,
}

/// Presenter node id for a path: trailing separator iff expandable.
pub fn node_id(path: &str, expandable: bool) -> String {
    if path == ROOT_PATH {
        return ROOT_PATH.to_string();
    }
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    if expandable {
        format!("{trimmed}/")
    } else {
        trimmed.to_string()
    }
}

/// Flatten the tree into visible rows for the given expanded-id set.
/// Children of collapsed nodes are skipped entirely, not filtered out.
pub fn flatten_visible(
    tree: &ResourceTree,
    policy: &TreePolicy,
    expanded_ids: &[String],
) -> Vec<VisibleRow> {
    let expanded: HashSet<&str> = expanded_ids.iter().map(String::as_str).collect();
    let mut rows = Vec::new();
    push_rows(tree, policy, ROOT_PATH, 0, &expanded, &mut rows);
    rows
}

/// A contiguous window of rows for virtualized rendering.
pub fn visible_window(rows: &[VisibleRow], offset: usize, limit: usize) -> &[VisibleRow] {
    let start = offset.min(rows.len());
    let end = (start + limit).min(rows.len());
    &rows[start..end]
}

/// Sibling order at one level: the folder display group first, then
/// case-insensitive lexical order by name (bytewise as tie-break).
pub fn sorted_children(tree: &ResourceTree, policy: &TreePolicy, path: &str) -> Vec<String> {
    let mut names: Vec<String> = tree.child_names(path).map(str::to_string).collect();
    names.sort_by(|left, right| {
        let left_folder = tree
            .get(&join_path(path, left))
            .is_some_and(|n| policy.displays_as_folder(n));
        let right_folder = tree
            .get(&join_path(path, right))
            .is_some_and(|n| policy.displays_as_folder(n));
        right_folder
            .cmp(&left_folder)
            .then_with(|| left.to_lowercase().cmp(&right.to_lowercase()))
            .then_with(|| left.cmp(right))
    });
    names
}

/// Ids to expand when a node is toggled open: the node itself plus the
/// chain of nested single-child folders below it, so single-child chains
/// open with one click. Computed from current tree shape, never stored;
/// there is deliberately no depth cap.
pub fn node_ids_to_expand(tree: &ResourceTree, policy: &TreePolicy, path: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let Some(mut node) = tree.get(path) else {
        return ids;
    };
    let mut current = crate::model::resources::canonical(path).to_string();
    ids.push(node_id(&current, policy.can_expand(node)));
    loop {
        if node.children.len() != 1 {
            break;
        }
        let only_child = node.children.iter().next().expect("len checked");
        let child_path = join_path(&current, only_child);
        let Some(child) = tree.get(&child_path) else {
            break;
        };
        if !policy.can_expand(child) {
            break;
        }
        ids.push(node_id(&child_path, true));
        current = child_path;
        node = child;
    }
    ids
}

/// Toggle a node id in the expansion set. Expanding adds the id and its
/// auto-expand chain; collapsing removes every expanded id that has the
/// toggled id as a string prefix, so the whole subtree folds shut.
pub fn toggle_expansion(
    expanded_ids: &mut Vec<String>,
    tree: &ResourceTree,
    policy: &TreePolicy,
    toggled_id: &str,
) {
    if expanded_ids.iter().any(|id| id == toggled_id) {
        expanded_ids.retain(|id| !id.starts_with(toggled_id));
    } else {
        for id in node_ids_to_expand(tree, policy, toggled_id) {
            if !expanded_ids.contains(&id) {
                expanded_ids.push(id);
            }
        }
    }
}

/// Whether `node_id` sits strictly below the selected id. Defined purely
/// on the id format: a prefix match on a separator-terminated selection,
/// excluding the exact match.
pub fn is_descendant_of_selected(node_id: &str, selected: &str) -> bool {
    node_id.starts_with(selected) && node_id != selected && selected.ends_with('/')
}

/// Expansion ids that reveal `path`: every separator-terminated prefix,
/// then the path itself as given. Applied when a navigation destination
/// lands on a resource that is not currently visible.
pub fn ancestor_ids(path: &str) -> Vec<String> {
    let mut ids = vec![ROOT_PATH.to_string()];
    if path == ROOT_PATH {
        return ids;
    }
    for (i, ch) in path.char_indices().skip(1) {
        if ch == '/' {
            ids.push(path[..=i].to_string());
        }
    }
    if !path.ends_with('/') {
        ids.push(path.to_string());
    }
    ids
}

fn push_rows(
    tree: &ResourceTree,
    policy: &TreePolicy,
    path: &str,
    depth: usize,
    expanded: &HashSet<&str>,
    rows: &mut Vec<VisibleRow>,
) {
    let Some(node) = tree.get(path) else {
        return;
    };
    let is_expandable = policy.can_expand(node);
    let id = node_id(path, is_expandable);
    let is_expanded = is_expandable && expanded.contains(id.as_str());
    rows.push(VisibleRow {
        node_id: id,
        display_name: node.name.clone(),
        is_expandable,
        is_expanded,
        depth,
    });
    if is_expanded {
        for name in sorted_children(tree, policy, path) {
            push_rows(tree, policy, &join_path(path, name.as_str()), depth + 1, expanded, rows);
        }
    }
}
