//! One image layer: its archive, its own file tree and its squash view.

use std::io::Read;
use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::archive::{LayerSource, Visit, entry_link_name, entry_name, for_each_entry, is_archive_metadata};
use crate::catalog::{FileCatalog, FileCatalogEntry};
use crate::image::error::{LayerError, LayerResult};
use crate::tree::path::{archive_entry_path, base_name};
use crate::tree::{FileNode, FileTree, NodeKind, NodeMetadata, marker_kind};
use crate::types::{FileReference, LayerDigest};

/// Summary of a parsed layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMetadata {
    pub index: usize,
    pub digest: LayerDigest,
    /// Sum of regular file sizes.
    pub size: u64,
    /// Number of archive entries registered in the catalog.
    pub entries: usize,
}

pub struct Layer {
    metadata: LayerMetadata,
    tree: FileTree,
    squashed: FileTree,
    source: Arc<dyn LayerSource>,
}

impl Layer {
    /// Parse the layer archive once, building the layer tree and registering
    /// every entry in `catalog` under a fresh reference.
    pub fn read(index: usize, source: Arc<dyn LayerSource>, catalog: &FileCatalog) -> LayerResult<Self> {
        let digest = source.digest();
        debug!(layer = index, digest = %digest, "Reading layer");

        let reader = source.open().map_err(|source| LayerError::Open { layer: index, source })?;
        catalog.register_source(Arc::clone(&source));

        let mut tree = FileTree::new();
        let mut size = 0;
        let mut entries = 0;

        for_each_entry::<_, LayerError, _>(reader, |position, archived| {
            if is_archive_metadata(archived) {
                return Ok(Visit::Continue);
            }

            let node = classify(index, &digest, position, archived)?;
            let payload = match node.kind {
                NodeKind::HardLink => hard_link_payload(&tree, catalog, &node),
                _ => None,
            };
            let mut entry = FileCatalogEntry::new(node.clone(), digest.clone(), position);
            if node.kind == NodeKind::HardLink {
                entry = entry.with_payload(payload);
            }

            if node.kind == NodeKind::Regular {
                size += node.metadata.size;
            }
            // The archive root carries no file of its own.
            if node.path() != "/" {
                tree.add(node).map_err(|e| LayerError::Entry {
                    layer: index,
                    index: position,
                    name: entry.entry_name().to_string(),
                    reason: e.to_string(),
                })?;
            }
            catalog.register(entry)?;
            entries += 1;
            Ok(Visit::Continue)
        })
        .map_err(|e| match e {
            LayerError::Io(source) => LayerError::Archive { layer: index, source },
            other => other,
        })?;

        debug!(layer = index, entries, size, nodes = tree.len(), "Layer read");

        Ok(Self {
            metadata: LayerMetadata { index, digest, size, entries },
            tree,
            squashed: FileTree::new(),
            source,
        })
    }

    pub fn index(&self) -> usize {
        self.metadata.index
    }

    pub fn digest(&self) -> &str {
        &self.metadata.digest
    }

    pub fn size(&self) -> u64 {
        self.metadata.size
    }

    pub fn metadata(&self) -> &LayerMetadata {
        &self.metadata
    }

    /// Nodes defined by this layer alone, deletion markers included.
    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    /// The filesystem as seen after this layer and every layer below it.
    pub fn squashed_tree(&self) -> &FileTree {
        &self.squashed
    }

    pub fn source(&self) -> &Arc<dyn LayerSource> {
        &self.source
    }

    pub(crate) fn set_squashed_tree(&mut self, squashed: FileTree) {
        self.squashed = squashed;
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("metadata", &self.metadata)
            .field("nodes", &self.tree.len())
            .field("squashed_nodes", &self.squashed.len())
            .finish()
    }
}

fn classify<R: Read>(
    layer: usize,
    digest: &str,
    index: usize,
    archived: &tar::Entry<'_, R>,
) -> LayerResult<FileNode> {
    let name = entry_name(archived);
    let fail = |reason: String| LayerError::Entry { layer, index, name: name.clone(), reason };

    let path = archive_entry_path(&name).map_err(|e| fail(e.to_string()))?;
    let header = archived.header();
    let entry_type = header.entry_type();

    let kind = match marker_kind(base_name(&path)) {
        Some(marker) => marker,
        None => match entry_type {
            tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::GNUSparse => {
                NodeKind::Regular
            }
            tar::EntryType::Directory => NodeKind::Directory,
            tar::EntryType::Symlink => NodeKind::Symlink,
            tar::EntryType::Link => NodeKind::HardLink,
            tar::EntryType::Char | tar::EntryType::Block | tar::EntryType::Fifo => NodeKind::Special,
            other => {
                return Err(LayerError::UnsupportedEntry {
                    layer,
                    index,
                    name: name.clone(),
                    entry_type: format!("{other:?}"),
                });
            }
        },
    };

    // Archivers leave numeric fields blank; blank mode, owner or mtime read as zero.
    let mtime = header.mtime().unwrap_or(0);
    let metadata = NodeMetadata {
        layer_digest: digest.to_string(),
        entry_name: name.clone(),
        size: header.size().map_err(|e| fail(e.to_string()))?,
        mode: header.mode().unwrap_or(0),
        uid: header.uid().unwrap_or(0),
        gid: header.gid().unwrap_or(0),
        modified: i64::try_from(mtime).ok().and_then(|secs| DateTime::from_timestamp(secs, 0)),
    };

    let node = FileNode::new(FileReference::new(path), kind, metadata);
    if !kind.is_link() {
        return Ok(node);
    }
    match entry_link_name(archived) {
        Some(target) if !target.is_empty() => Ok(node.with_link_target(target)),
        _ => Err(fail("Link entry has no target".to_string())),
    }
}

/// Payload a hard link shares: the payload of its target, which must appear
/// earlier in the same archive.
fn hard_link_payload(tree: &FileTree, catalog: &FileCatalog, link: &FileNode) -> Option<FileReference> {
    let target = link.link_target.as_deref().and_then(|t| archive_entry_path(t).ok())?;
    let payload = tree
        .node(&target)
        .and_then(|node| catalog.get(&node.reference))
        .and_then(|entry| entry.payload);
    if payload.is_none() {
        warn!(path = %link.path(), target = %target, "Hard link target not found earlier in layer");
    }
    payload
}
