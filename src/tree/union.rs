//! Union squash: overlay-filesystem semantics over an ordered tree stack.
//!
//! Provides a merged view of files across layers. The topmost layer that
//! touches a path wins; deletion markers remove lower paths and never show
//! up in the result.

use tracing::trace;

use crate::tree::file_tree::FileTree;
use crate::tree::node::{FileNode, NodeKind};

/// Overlay `upper` on top of `lower`, returning the merged tree.
///
/// 1. opaque markers clear everything beneath their directory,
/// 2. whiteouts remove the named path and its subtree,
/// 3. every other node overwrites whatever `lower` held at its path.
pub fn union(lower: &FileTree, upper: &FileTree) -> FileTree {
    let mut result = lower.clone();

    for marker in upper.nodes().filter(|n| n.kind == NodeKind::OpaqueWhiteout) {
        if let Some(dir) = marker.marker_target() {
            let removed = result.clear_beneath(&dir);
            trace!(dir = %dir, removed, "Applied opaque directory");
        }
    }

    for node in upper.nodes() {
        match node.kind {
            NodeKind::OpaqueWhiteout => {}
            NodeKind::Whiteout => {
                if let Some(target) = node.marker_target() {
                    let removed = result.remove_subtree(&target);
                    trace!(path = %target, removed, "Applied whiteout");
                }
            }
            _ => overlay_node(&mut result, node),
        }
    }

    result
}

/// Squash a whole stack, bottom first. Equivalent to folding [`union`].
pub fn squash<'a>(stack: impl IntoIterator<Item = &'a FileTree>) -> FileTree {
    stack.into_iter().fold(FileTree::new(), |acc, tree| union(&acc, tree))
}

fn overlay_node(result: &mut FileTree, node: &FileNode) {
    let existing_is_dir = result.node(node.path()).map(FileNode::is_dir);

    match existing_is_dir {
        // A synthesized parent says nothing about the directory below it.
        Some(true) if node.implicit => return,
        Some(true) if !node.is_dir() => {
            result.remove_subtree(node.path());
        }
        _ => {}
    }

    result.put(node.clone());
}
