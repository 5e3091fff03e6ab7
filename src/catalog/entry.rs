use serde::{Deserialize, Serialize};

use crate::tree::FileNode;
use crate::types::{FileReference, LayerDigest};

/// Catalog record for one archive entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCatalogEntry {
    pub node: FileNode,
    pub layer_digest: LayerDigest,
    /// Position of the entry within its layer archive.
    pub archive_index: usize,
    /// Reference whose archive entry carries this file's bytes: itself for a
    /// regular file, the link target for a hard link, none otherwise.
    pub payload: Option<FileReference>,
}

impl FileCatalogEntry {
    pub fn new(node: FileNode, layer_digest: impl Into<LayerDigest>, archive_index: usize) -> Self {
        let payload = node.kind.has_payload().then(|| node.reference.clone());
        Self { node, layer_digest: layer_digest.into(), archive_index, payload }
    }

    pub fn with_payload(mut self, payload: Option<FileReference>) -> Self {
        self.payload = payload;
        self
    }

    pub fn reference(&self) -> &FileReference {
        &self.node.reference
    }

    /// Entry name recorded in the archive header during parsing.
    pub fn entry_name(&self) -> &str {
        &self.node.metadata.entry_name
    }
}
