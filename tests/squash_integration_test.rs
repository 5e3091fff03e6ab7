//! Squash integration tests - overlay semantics across layer stacks

use std::collections::{BTreeMap, HashMap};

use layerscope::tree::{FileNode, FileTree, NodeKind, NodeMetadata, squash, union};
use layerscope::{FileReference, ReferenceId};
use proptest::prelude::*;

const PATHS: [&str; 6] = ["/a/1", "/a/2", "/a/b/1", "/b/1", "/b/2", "/c"];

fn regular(path: &str) -> FileNode {
    FileNode::new(FileReference::new(path), NodeKind::Regular, NodeMetadata::default())
}

fn marker(path: &str, kind: NodeKind) -> FileNode {
    FileNode::new(FileReference::new(path), kind, NodeMetadata::default())
}

fn whiteout_for(path: &str) -> String {
    let (dir, name) = path.rsplit_once('/').unwrap();
    format!("{dir}/.wh.{name}")
}

/// Build one layer from `(path index, define)` operations, returning the
/// tree and the references it defines.
fn layer(ops: &BTreeMap<usize, bool>) -> (FileTree, Vec<(String, ReferenceId)>) {
    let mut tree = FileTree::new();
    let mut defined = Vec::new();
    for (&index, &define) in ops {
        let path = PATHS[index];
        if define {
            let node = regular(path);
            defined.push((path.to_string(), node.reference.id));
            tree.add(node).unwrap();
        } else {
            tree.add(marker(&whiteout_for(path), NodeKind::Whiteout)).unwrap();
        }
    }
    (tree, defined)
}

fn regular_files(tree: &FileTree) -> HashMap<String, ReferenceId> {
    tree.nodes()
        .filter(|node| node.kind == NodeKind::Regular)
        .map(|node| (node.path().to_string(), node.reference.id))
        .collect()
}

fn stack_strategy() -> impl Strategy<Value = Vec<BTreeMap<usize, bool>>> {
    prop::collection::vec(prop::collection::btree_map(0..PATHS.len(), any::<bool>(), 0..6), 1..6)
}

proptest! {
    #[test]
    fn prop_last_definer_wins(stack in stack_strategy()) {
        let mut trees = Vec::new();
        let mut expected: HashMap<String, ReferenceId> = HashMap::new();

        for ops in &stack {
            let (tree, defined) = layer(ops);
            for (&index, &define) in ops {
                if !define {
                    expected.remove(PATHS[index]);
                }
            }
            expected.extend(defined);
            trees.push(tree);

            // Every prefix of the stack agrees with the model.
            prop_assert_eq!(regular_files(&squash(&trees)), expected.clone());
        }
    }

    #[test]
    fn prop_incremental_squash_matches_full(stack in stack_strategy()) {
        let trees: Vec<FileTree> = stack.iter().map(|ops| layer(ops).0).collect();
        let full = squash(&trees);

        let mut incremental = FileTree::new();
        for tree in &trees {
            incremental = union(&incremental, tree);
        }
        prop_assert_eq!(&incremental, &full);

        if trees.len() >= 3 {
            let split = union(&squash(&trees[..2]), &trees[2]);
            prop_assert_eq!(split, squash(&trees[..3]));
        }
    }

    #[test]
    fn prop_markers_never_survive(stack in stack_strategy()) {
        let trees: Vec<FileTree> = stack.iter().map(|ops| layer(ops).0).collect();
        let squashed = squash(&trees);
        prop_assert!(squashed.nodes().all(|node| !node.kind.is_marker()));
    }

    #[test]
    fn prop_opaque_directory_hides_lower_paths(stack in stack_strategy()) {
        let mut trees: Vec<FileTree> = stack.iter().map(|ops| layer(ops).0).collect();
        let lower = squash(&trees);

        let mut top = FileTree::new();
        top.add(marker("/a/.wh..wh..opq", NodeKind::OpaqueWhiteout)).unwrap();
        trees.push(top);
        let squashed = squash(&trees);

        prop_assert!(squashed.paths().all(|path| !path.starts_with("/a/")));
        for (path, id) in regular_files(&lower) {
            if !path.starts_with("/a/") {
                prop_assert_eq!(squashed.node(&path).map(|node| node.reference.id), Some(id));
            }
        }
    }
}

#[test]
fn test_whiteout_removes_directory_subtree() {
    let mut lower = FileTree::new();
    lower.add(regular("/var/log/app/current")).unwrap();
    lower.add(regular("/var/lib/db")).unwrap();

    let mut upper = FileTree::new();
    upper.add(marker("/var/.wh.log", NodeKind::Whiteout)).unwrap();

    let squashed = union(&lower, &upper);
    assert!(!squashed.contains("/var/log"));
    assert!(!squashed.contains("/var/log/app/current"));
    assert!(squashed.contains("/var/lib/db"));
}

#[test]
fn test_opaque_directory_keeps_same_layer_entries() {
    let mut lower = FileTree::new();
    lower.add(regular("/etc/old.conf")).unwrap();
    lower.add(regular("/usr/bin/tool")).unwrap();

    let mut upper = FileTree::new();
    upper.add(marker("/etc/.wh..wh..opq", NodeKind::OpaqueWhiteout)).unwrap();
    let fresh = regular("/etc/new.conf");
    let fresh_ref = fresh.reference.clone();
    upper.add(fresh).unwrap();

    let squashed = union(&lower, &upper);
    assert!(!squashed.contains("/etc/old.conf"));
    assert_eq!(squashed.node("/etc/new.conf").unwrap().reference, fresh_ref);
    assert!(squashed.contains("/etc"));
    assert!(squashed.contains("/usr/bin/tool"));
}

#[test]
fn test_file_replacing_directory_drops_descendants() {
    let mut lower = FileTree::new();
    lower.add(regular("/opt/app/bin/run")).unwrap();

    let mut upper = FileTree::new();
    upper.add(regular("/opt/app")).unwrap();

    let squashed = union(&lower, &upper);
    assert_eq!(squashed.node("/opt/app").unwrap().kind, NodeKind::Regular);
    assert!(!squashed.contains("/opt/app/bin"));
    assert!(!squashed.contains("/opt/app/bin/run"));
}

#[test]
fn test_squash_of_first_layer_strips_markers() {
    let mut base = FileTree::new();
    base.add(regular("/etc/hosts")).unwrap();
    base.add(marker("/etc/.wh.passwd", NodeKind::Whiteout)).unwrap();

    let squashed = squash([&base]);
    assert!(squashed.contains("/etc/hosts"));
    assert!(!squashed.contains("/etc/.wh.passwd"));
}
