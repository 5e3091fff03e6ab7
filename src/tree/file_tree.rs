//! Path-indexed tree of file nodes for one filesystem snapshot.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::tree::error::{TreeError, TreeResult};
use crate::tree::node::FileNode;
use crate::tree::path::{is_beneath, normalize_path, parent_path};
use crate::tree::resolver::{self, Lookup, ResolutionOptions};

/// Ordered mapping from normalized absolute path to [`FileNode`].
///
/// Paths are unique: adding an existing path replaces its node. Parent
/// directories are synthesized on insert so every node has an ancestry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    nodes: BTreeMap<String, FileNode>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `node` at its real path, creating missing parents.
    pub fn add(&mut self, node: FileNode) -> TreeResult<()> {
        let path = normalize_path(node.path())?;
        if path != node.path() {
            return Err(TreeError::InvalidPath(format!(
                "Node path is not normalized: {} (expected {path})",
                node.path()
            )));
        }

        let mut missing = Vec::new();
        let mut cursor = parent_path(&path);
        while let Some(dir) = cursor {
            if dir == "/" || self.nodes.contains_key(&dir) {
                break;
            }
            cursor = parent_path(&dir);
            missing.push(dir);
        }
        for dir in missing.into_iter().rev() {
            self.nodes.insert(dir.clone(), FileNode::implicit_directory(&dir));
        }

        self.nodes.insert(path, node);
        Ok(())
    }

    /// Insert without synthesizing parents. Callers guarantee ancestry.
    pub(crate) fn put(&mut self, node: FileNode) {
        self.nodes.insert(node.path().to_string(), node);
    }

    /// Remove exactly one node; descendants are left in place.
    pub fn remove(&mut self, path: &str) -> Option<FileNode> {
        self.nodes.remove(path)
    }

    /// Remove a node together with everything beneath it.
    pub fn remove_subtree(&mut self, path: &str) -> usize {
        let removed = self.clear_beneath(path);
        removed + usize::from(self.nodes.remove(path).is_some())
    }

    /// Remove every node strictly beneath `dir`, keeping `dir` itself.
    pub fn clear_beneath(&mut self, dir: &str) -> usize {
        let doomed = self.descendant_paths(dir);
        for path in &doomed {
            self.nodes.remove(path);
        }
        doomed.len()
    }

    /// The literal node stored at `path`, without following links.
    pub fn node(&self, path: &str) -> Option<&FileNode> {
        self.nodes.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Look up `path`, following links as `options` allow.
    ///
    /// Symlinked ancestor directories are always followed. Absent paths are
    /// `Ok(None)`; dead links come back as the link itself with
    /// [`LinkStatus::Dead`](super::LinkStatus::Dead).
    pub fn lookup(&self, path: &str, options: &ResolutionOptions) -> TreeResult<Option<Lookup>> {
        resolver::resolve(self, path, options)
    }

    /// Immediate children of `dir`, in path order.
    pub fn children<'a>(&'a self, dir: &'a str) -> Vec<&'a FileNode> {
        self.beneath(dir)
            .filter(|node| parent_path(node.path()).as_deref() == Some(dir))
            .collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FileNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn beneath<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = &'a FileNode> + 'a {
        let start = if dir == "/" { "/".to_string() } else { format!("{dir}/") };
        self.nodes
            .range::<String, _>((Bound::Excluded(&start), Bound::Unbounded))
            .map(|(_, node)| node)
            .take_while(move |node| is_beneath(node.path(), dir))
    }

    fn descendant_paths(&self, dir: &str) -> Vec<String> {
        self.beneath(dir).map(|node| node.path().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::{NodeKind, NodeMetadata};
    use crate::types::FileReference;

    fn node(path: &str, kind: NodeKind) -> FileNode {
        FileNode::new(FileReference::new(path), kind, NodeMetadata::default())
    }

    #[test]
    fn test_add_synthesizes_parents() {
        let mut tree = FileTree::new();
        tree.add(node("/usr/local/bin/tool", NodeKind::Regular)).unwrap();

        assert_eq!(tree.len(), 4);
        assert!(tree.node("/usr").unwrap().implicit);
        assert!(tree.node("/usr/local").unwrap().is_dir());
        assert!(!tree.node("/usr/local/bin/tool").unwrap().implicit);
    }

    #[test]
    fn test_add_keeps_existing_parent() {
        let mut tree = FileTree::new();
        let etc = node("/etc", NodeKind::Directory);
        let etc_ref = etc.reference.clone();
        tree.add(etc).unwrap();
        tree.add(node("/etc/hosts", NodeKind::Regular)).unwrap();

        assert_eq!(tree.node("/etc").unwrap().reference, etc_ref);
    }

    #[test]
    fn test_add_last_write_wins() {
        let mut tree = FileTree::new();
        tree.add(node("/etc/app.conf", NodeKind::Regular)).unwrap();
        let second = node("/etc/app.conf", NodeKind::Regular);
        let second_ref = second.reference.clone();
        tree.add(second).unwrap();

        assert_eq!(tree.node("/etc/app.conf").unwrap().reference, second_ref);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_add_rejects_unnormalized_path() {
        let mut tree = FileTree::new();
        assert!(tree.add(node("/etc//hosts", NodeKind::Regular)).is_err());
        assert!(tree.add(node("etc", NodeKind::Regular)).is_err());
    }

    #[test]
    fn test_remove_single_node() {
        let mut tree = FileTree::new();
        tree.add(node("/var/log/syslog", NodeKind::Regular)).unwrap();

        assert!(tree.remove("/var/log").is_some());
        assert!(tree.contains("/var/log/syslog"));
        assert!(tree.remove("/missing").is_none());
    }

    #[test]
    fn test_remove_subtree() {
        let mut tree = FileTree::new();
        tree.add(node("/var/log/syslog", NodeKind::Regular)).unwrap();
        tree.add(node("/var/log/apt/history", NodeKind::Regular)).unwrap();
        tree.add(node("/var/logs", NodeKind::Regular)).unwrap();

        assert_eq!(tree.remove_subtree("/var/log"), 4);
        assert!(!tree.contains("/var/log"));
        assert!(tree.contains("/var/logs"));
        assert!(tree.contains("/var"));
    }

    #[test]
    fn test_clear_beneath_keeps_dir() {
        let mut tree = FileTree::new();
        tree.add(node("/opt/app/a", NodeKind::Regular)).unwrap();
        tree.add(node("/opt/app/b", NodeKind::Regular)).unwrap();

        assert_eq!(tree.clear_beneath("/opt/app"), 2);
        assert!(tree.contains("/opt/app"));
    }

    #[test]
    fn test_clear_beneath_root() {
        let mut tree = FileTree::new();
        tree.add(node("/", NodeKind::Directory)).unwrap();
        tree.add(node("/a/b", NodeKind::Regular)).unwrap();

        assert_eq!(tree.clear_beneath("/"), 2);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_children() {
        let mut tree = FileTree::new();
        tree.add(node("/etc/hosts", NodeKind::Regular)).unwrap();
        tree.add(node("/etc/ssl/cert.pem", NodeKind::Regular)).unwrap();
        tree.add(node("/etc-backup", NodeKind::Regular)).unwrap();

        let names: Vec<&str> = tree.children("/etc").iter().map(|n| n.path()).collect();
        assert_eq!(names, vec!["/etc/hosts", "/etc/ssl"]);

        let top: Vec<&str> = tree.children("/").iter().map(|n| n.path()).collect();
        assert_eq!(top, vec!["/etc", "/etc-backup"]);
    }

    #[test]
    fn test_paths_are_ordered() {
        let mut tree = FileTree::new();
        tree.add(node("/b", NodeKind::Regular)).unwrap();
        tree.add(node("/a", NodeKind::Regular)).unwrap();

        let paths: Vec<&str> = tree.paths().collect();
        assert_eq!(paths, vec!["/a", "/b"]);
    }
}
