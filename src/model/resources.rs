//! Resource tree — path-arena model of the audited hierarchy
//!
//! The tree arrives as data (a nested `name → subtree | 1` map produced by
//! the import layer), not from disk. It is materialized once per load into
//! a flat arena keyed by full path, so every lookup is O(1) amortized and
//! no node can ever appear as its own descendant: arena keys are always
//! strictly longer than their parent's key.
//!
//! A node is one of three kinds:
//! - *leaf*: carries a terminal marker, no children
//! - *folder*: children only
//! - *file with children*: both — e.g. an archive whose contents were
//!   extracted. Marked at load time from the files-with-children set.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Root path of every tree.
pub const ROOT_PATH: &str = "/";

// ─── Input Shape ───────────────────────────────────────────────────

/// Nested tree shape as supplied by the import layer: a leaf is the
/// literal `1`, anything else is a map of child names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceInput {
    Leaf(u8),
    Dir(BTreeMap<String, ResourceInput>),
}

impl Default for ResourceInput {
    fn default() -> Self {
        Self::Dir(BTreeMap::new())
    }
}

impl ResourceInput {
    pub fn leaf() -> Self {
        Self::Leaf(1)
    }

    pub fn dir(children: impl IntoIterator<Item = (String, ResourceInput)>) -> Self {
        Self::Dir(children.into_iter().collect())
    }
}

// ─── Nodes ─────────────────────────────────────────────────────────

/// One node in the arena. `attributable` is the terminal marker: true for
/// leaves and files-with-children, false for plain folders.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub name: String,
    pub children: BTreeSet<String>,
    pub attributable: bool,
}

impl ResourceNode {
    pub fn is_leaf(&self) -> bool {
        self.attributable && self.children.is_empty()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_file_with_children(&self) -> bool {
        self.attributable && !self.children.is_empty()
    }
}

// ─── Tree ──────────────────────────────────────────────────────────

/// Path-indexed arena of resources. Built once per project load, replaced
/// wholesale on the next load/merge.
#[derive(Debug, Clone, Default)]
pub struct ResourceTree {
    arena: HashMap<String, ResourceNode>,
}

impl ResourceTree {
    /// Materialize the arena from the nested input map. Directory nodes
    /// whose path appears in `files_with_children` carry the terminal
    /// marker in addition to their children.
    pub fn from_input(input: &ResourceInput, files_with_children: &HashSet<String>) -> Self {
        let mut arena = HashMap::new();
        let root_children = match input {
            ResourceInput::Dir(children) => children,
            // A bare leaf as the whole tree is degenerate but harmless.
            ResourceInput::Leaf(_) => {
                arena.insert(
                    ROOT_PATH.to_string(),
                    ResourceNode {
                        name: "/".to_string(),
                        children: BTreeSet::new(),
                        attributable: true,
                    },
                );
                return Self { arena };
            }
        };

        arena.insert(
            ROOT_PATH.to_string(),
            ResourceNode {
                name: "/".to_string(),
                children: root_children.keys().cloned().collect(),
                attributable: false,
            },
        );
        for (name, child) in root_children {
            insert_subtree(&mut arena, ROOT_PATH, name, child, files_with_children);
        }

        tracing::info!("Resource tree materialized: {} nodes", arena.len());
        Self { arena }
    }

    /// Lookup a node. Trailing separators (presenter node ids) are
    /// accepted. Absence is a value, never an error.
    pub fn get(&self, path: &str) -> Option<&ResourceNode> {
        self.arena.get(canonical(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.arena.contains_key(canonical(path))
    }

    /// Ordered child names of a node; empty for leaves and unknown paths.
    pub fn child_names(&self, path: &str) -> impl Iterator<Item = &str> {
        self.get(path)
            .map(|n| n.children.iter().map(String::as_str))
            .into_iter()
            .flatten()
    }

    pub fn is_leaf(&self, path: &str) -> bool {
        self.get(path).is_some_and(ResourceNode::is_leaf)
    }

    pub fn has_children(&self, path: &str) -> bool {
        self.get(path).is_some_and(ResourceNode::has_children)
    }

    pub fn is_file_with_children(&self, path: &str) -> bool {
        self.get(path).is_some_and(ResourceNode::is_file_with_children)
    }

    /// Every path in the arena, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.arena.keys().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    /// Number of nodes carrying the terminal marker (leaves plus
    /// files-with-children). This is what coverage totals count.
    pub fn attributable_count(&self) -> usize {
        self.arena.values().filter(|n| n.attributable).count()
    }
}

/// Full child path for `name` under `parent`.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Strip a trailing separator so presenter node ids and plain paths address
/// the same arena entry. The root is its own canonical form.
pub fn canonical(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// The path itself followed by every proper ancestor up to the root.
/// This is the dirty chain for incremental coverage invalidation.
pub fn chain_to_root(path: &str) -> Vec<String> {
    let path = canonical(path);
    let mut chain = vec![path.to_string()];
    let mut current = path;
    while let Some(idx) = current.rfind('/') {
        if idx == 0 {
            if current != ROOT_PATH {
                chain.push(ROOT_PATH.to_string());
            }
            break;
        }
        current = &current[..idx];
        chain.push(current.to_string());
    }
    chain
}

fn insert_subtree(
    arena: &mut HashMap<String, ResourceNode>,
    parent: &str,
    name: &str,
    input: &ResourceInput,
    files_with_children: &HashSet<String>,
) {
    let path = join_path(parent, name);
    match input {
        ResourceInput::Leaf(_) => {
            arena.insert(
                path,
                ResourceNode {
                    name: name.to_string(),
                    children: BTreeSet::new(),
                    attributable: true,
                },
            );
        }
        ResourceInput::Dir(children) => {
            let marked = files_with_children
                .iter()
                .any(|p| canonical(p) == path.as_str());
            arena.insert(
                path.clone(),
                ResourceNode {
                    name: name.to_string(),
                    children: children.keys().cloned().collect(),
                    attributable: marked,
                },
            );
            for (child_name, child) in children {
                insert_subtree(arena, &path, child_name, child, files_with_children);
            }
        }
    }
}
