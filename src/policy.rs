//! Breakpoint & virtual-folder policy
//!
//! The single place that decides where attribution inheritance stops and
//! which nodes count as folders. Both the coverage engine and the tree
//! presenter consult these predicates; no other component re-derives them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::resources::{canonical, ResourceNode};

/// Pure predicates over the breakpoint set and the files-with-children set.
/// Paths are accepted with or without a trailing separator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreePolicy {
    breakpoints: HashSet<String>,
    files_with_children: HashSet<String>,
    /// When set, files-with-children join the folder sort group and render
    /// with folder affordances. Off by default: they display as
    /// non-expandable-looking files, matching the original tool.
    #[serde(default)]
    pub show_files_with_children_as_folders: bool,
}

impl TreePolicy {
    pub fn new(breakpoints: HashSet<String>, files_with_children: HashSet<String>) -> Self {
        Self {
            breakpoints: breakpoints
                .into_iter()
                .map(|p| canonical(&p).to_string())
                .collect(),
            files_with_children: files_with_children
                .into_iter()
                .map(|p| canonical(&p).to_string())
                .collect(),
            show_files_with_children_as_folders: false,
        }
    }

    /// Attribution inheritance must not cross this path in either
    /// direction; coverage aggregates the subtree below it as one unit.
    pub fn is_breakpoint(&self, path: &str) -> bool {
        self.breakpoints.contains(canonical(path))
    }

    pub fn is_file_with_children(&self, path: &str) -> bool {
        self.files_with_children.contains(canonical(path))
    }

    /// Whether the node joins the folder display group: interior nodes
    /// always do, files-with-children only when the toggle is on.
    pub fn displays_as_folder(&self, node: &ResourceNode) -> bool {
        if node.is_file_with_children() {
            self.show_files_with_children_as_folders
        } else {
            node.has_children()
        }
    }

    /// Whether the node can be expanded in the presenter. Anything with
    /// children can, including files-with-children.
    pub fn can_expand(&self, node: &ResourceNode) -> bool {
        node.has_children()
    }

    pub fn breakpoints(&self) -> &HashSet<String> {
        &self.breakpoints
    }

    pub fn files_with_children(&self) -> &HashSet<String> {
        &self.files_with_children
    }
}
