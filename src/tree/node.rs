//! File nodes: one entry of a [`FileTree`](super::FileTree).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tree::path::{base_name, parent_path};
use crate::types::{FileReference, LayerDigest};

/// Prefix marking a deleted path in a layer archive.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Marker file name making its parent directory opaque.
pub const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// Kind of a file node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Regular,
    Directory,
    Symlink,
    HardLink,
    /// Character/block device or fifo.
    Special,
    /// Deletes the sibling path named by stripping the `.wh.` prefix.
    Whiteout,
    /// Hides every lower-layer path beneath the parent directory.
    OpaqueWhiteout,
}

impl NodeKind {
    pub fn is_link(self) -> bool {
        matches!(self, NodeKind::Symlink | NodeKind::HardLink)
    }

    pub fn is_marker(self) -> bool {
        matches!(self, NodeKind::Whiteout | NodeKind::OpaqueWhiteout)
    }

    /// True for kinds whose archive entry carries file bytes.
    pub fn has_payload(self) -> bool {
        matches!(self, NodeKind::Regular)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeKind::Regular => "file",
            NodeKind::Directory => "dir",
            NodeKind::Symlink => "symlink",
            NodeKind::HardLink => "hardlink",
            NodeKind::Special => "special",
            NodeKind::Whiteout => "whiteout",
            NodeKind::OpaqueWhiteout => "opaque",
        };
        f.write_str(name)
    }
}

/// Where a node came from and the attributes recorded in its archive header.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub layer_digest: LayerDigest,
    /// Raw entry name as recorded in the archive header.
    pub entry_name: String,
    pub size: u64,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub reference: FileReference,
    pub kind: NodeKind,
    /// Raw link target for symlinks and hard links.
    pub link_target: Option<String>,
    pub metadata: NodeMetadata,
    /// Directory synthesized because a descendant was inserted before it.
    pub implicit: bool,
}

impl FileNode {
    pub fn new(reference: FileReference, kind: NodeKind, metadata: NodeMetadata) -> Self {
        Self { reference, kind, link_target: None, metadata, implicit: false }
    }

    pub fn with_link_target(mut self, target: impl Into<String>) -> Self {
        self.link_target = Some(target.into());
        self
    }

    /// Synthesized parent directory for `path`.
    pub fn implicit_directory(path: &str) -> Self {
        Self {
            reference: FileReference::new(path),
            kind: NodeKind::Directory,
            link_target: None,
            metadata: NodeMetadata { mode: 0o755, ..NodeMetadata::default() },
            implicit: true,
        }
    }

    pub fn path(&self) -> &str {
        &self.reference.real_path
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// For a deletion marker, the path it removes from lower layers: the
    /// whited-out sibling, or the opaque directory itself.
    pub fn marker_target(&self) -> Option<String> {
        let parent = parent_path(self.path())?;
        match self.kind {
            NodeKind::OpaqueWhiteout => Some(parent),
            NodeKind::Whiteout => {
                let name = base_name(self.path()).strip_prefix(WHITEOUT_PREFIX)?;
                if parent == "/" { Some(format!("/{name}")) } else { Some(format!("{parent}/{name}")) }
            }
            _ => None,
        }
    }
}

/// Classify a base name as a deletion marker, if it is one.
pub fn marker_kind(name: &str) -> Option<NodeKind> {
    if name == OPAQUE_WHITEOUT {
        Some(NodeKind::OpaqueWhiteout)
    } else if name.starts_with(WHITEOUT_PREFIX) && name.len() > WHITEOUT_PREFIX.len() {
        Some(NodeKind::Whiteout)
    } else {
        None
    }
}
