//! Symlink and hard link resolution against one [`FileTree`].
//!
//! The same walk serves a single layer's squash and the whole image squash;
//! only the tree handed in differs.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::tree::error::TreeResult;
use crate::tree::file_tree::FileTree;
use crate::tree::node::{FileNode, NodeKind};
use crate::tree::path::{archive_entry_path, normalize_path, path_components, resolve_link_target};
use crate::types::FileReference;

/// Hop bound matching the kernel's `MAXSYMLINKS`.
pub const DEFAULT_MAX_LINK_HOPS: usize = 40;

/// One resolution policy. Enabled policies apply together, as a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LinkOption {
    /// Follow a link found at the final path component.
    FollowBasenameLinks,
    /// When a chain ends at a missing target, report the last link that
    /// still resolved instead of the link originally asked for.
    StopAtLastLiveLink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOptions {
    options: BTreeSet<LinkOption>,
    max_hops: usize,
}

impl Default for ResolutionOptions {
    fn default() -> Self {
        Self { options: BTreeSet::new(), max_hops: DEFAULT_MAX_LINK_HOPS }
    }
}

impl ResolutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options used for image-level queries: basename links are followed.
    pub fn following_links() -> Self {
        Self::new().with(LinkOption::FollowBasenameLinks)
    }

    pub fn with(mut self, option: LinkOption) -> Self {
        self.options.insert(option);
        self
    }

    pub fn with_all(mut self, options: impl IntoIterator<Item = LinkOption>) -> Self {
        self.options.extend(options);
        self
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn contains(&self, option: LinkOption) -> bool {
        self.options.contains(&option)
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }
}

/// How a lookup ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    /// The node at the path is not a link.
    NotLink,
    /// The node is a link but the options did not ask to follow it.
    Unfollowed,
    /// The chain ended at a non-link node.
    Resolved,
    /// The chain reached a missing target.
    Dead,
    /// The chain revisited a path; resolution stopped at the repeating link.
    Cycle,
    /// The chain exceeded the hop bound.
    DepthExceeded,
}

/// Outcome of [`FileTree::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// Node stored at the requested path (after ancestor links).
    pub requested: FileNode,
    /// Terminal node of the resolution.
    pub resolved: FileNode,
    pub status: LinkStatus,
    pub hops: usize,
}

impl Lookup {
    /// The resolved reference.
    pub fn reference(&self) -> &FileReference {
        &self.resolved.reference
    }

    /// True when resolution moved off the requested node.
    pub fn advanced(&self) -> bool {
        self.requested.reference != self.resolved.reference
    }
}

pub(crate) fn resolve(
    tree: &FileTree,
    path: &str,
    options: &ResolutionOptions,
) -> TreeResult<Option<Lookup>> {
    let path = normalize_path(path)?;
    let mut walk = Walk { tree, max_hops: options.max_hops(), hops: 0 };

    let Some(node) = walk.real_path(&path).and_then(|real| tree.node(&real)) else {
        return Ok(None);
    };

    if !node.kind.is_link() {
        return Ok(Some(walk.finish(node, node, LinkStatus::NotLink)));
    }
    if !options.contains(LinkOption::FollowBasenameLinks) {
        return Ok(Some(walk.finish(node, node, LinkStatus::Unfollowed)));
    }

    let mut visited: HashSet<&str> = HashSet::from([node.path()]);
    let mut current = node;
    loop {
        if walk.hops >= walk.max_hops {
            return Ok(Some(walk.finish(node, current, LinkStatus::DepthExceeded)));
        }
        walk.hops += 1;

        let next = link_target_path(current)
            .and_then(|target| walk.real_path(&target))
            .and_then(|real| tree.node(&real));

        match next {
            None => {
                let resolved =
                    if options.contains(LinkOption::StopAtLastLiveLink) { current } else { node };
                return Ok(Some(walk.finish(node, resolved, LinkStatus::Dead)));
            }
            Some(next) if visited.contains(next.path()) => {
                return Ok(Some(walk.finish(node, current, LinkStatus::Cycle)));
            }
            Some(next) if !next.kind.is_link() => {
                return Ok(Some(walk.finish(node, next, LinkStatus::Resolved)));
            }
            Some(next) => {
                visited.insert(next.path());
                current = next;
            }
        }
    }
}

/// Absolute path a link node points at.
pub(crate) fn link_target_path(node: &FileNode) -> Option<String> {
    let target = node.link_target.as_deref()?;
    match node.kind {
        NodeKind::Symlink => resolve_link_target(node.path(), target).ok(),
        NodeKind::HardLink => archive_entry_path(target).ok(),
        _ => None,
    }
}

struct Walk<'t> {
    tree: &'t FileTree,
    max_hops: usize,
    hops: usize,
}

impl<'t> Walk<'t> {
    /// Rewrite `path` so no ancestor component is a link. `None` when an
    /// ancestor is missing, dead, cyclic or too deep.
    fn real_path(&mut self, path: &str) -> Option<String> {
        let components = path_components(path).ok()?;
        let Some((last, ancestors)) = components.split_last() else {
            return Some("/".to_string());
        };

        let mut current = String::from("/");
        for name in ancestors {
            let candidate = join(&current, name);
            let node = self.tree.node(&candidate)?;
            current = if node.kind.is_link() {
                self.follow_to_terminal(node)?.path().to_string()
            } else {
                candidate
            };
        }
        Some(join(&current, last))
    }

    fn follow_to_terminal(&mut self, link: &'t FileNode) -> Option<&'t FileNode> {
        let mut visited: HashSet<&str> = HashSet::from([link.path()]);
        let mut current = link;
        while current.kind.is_link() {
            if self.hops >= self.max_hops {
                return None;
            }
            self.hops += 1;
            let target = link_target_path(current)?;
            let real = self.real_path(&target)?;
            let next = self.tree.node(&real)?;
            if !visited.insert(next.path()) {
                return None;
            }
            current = next;
        }
        Some(current)
    }

    fn finish(&self, requested: &FileNode, resolved: &FileNode, status: LinkStatus) -> Lookup {
        Lookup { requested: requested.clone(), resolved: resolved.clone(), status, hops: self.hops }
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir == "/" { format!("/{name}") } else { format!("{dir}/{name}") }
}
