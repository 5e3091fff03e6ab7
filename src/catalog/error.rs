use std::sync::Arc;

use thiserror::Error;

use crate::types::{FileReference, LayerDigest};

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Reference already registered: {0}")]
    DuplicateReference(FileReference),

    #[error("Unknown file reference: {0}")]
    UnknownReference(FileReference),

    #[error("No catalog entry at layer {layer_digest} index {index}")]
    UnknownPosition { layer_digest: LayerDigest, index: usize },

    #[error("No archive registered for layer {0}")]
    UnknownLayer(LayerDigest),

    #[error("Archive for layer {layer_digest} ended before entry {index} ({name})")]
    EntryMissing { layer_digest: LayerDigest, index: usize, name: String },

    #[error("Mismatched archive entry names: {found:?} != {expected:?}")]
    EntryMismatch { expected: String, found: String },

    #[error("Content store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Layer source error: {0}")]
    Source(#[from] anyhow::Error),
}

impl CatalogError {
    /// Recover an owned error from the single-flight content cache.
    ///
    /// The cache may still hold the `Arc`, so the variant is rebuilt rather
    /// than unwrapped. Sources of I/O and layer errors survive as messages.
    pub(crate) fn from_shared(err: Arc<CatalogError>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(|shared| shared.rebuild())
    }

    fn rebuild(&self) -> Self {
        match self {
            Self::DuplicateReference(reference) => Self::DuplicateReference(reference.clone()),
            Self::UnknownReference(reference) => Self::UnknownReference(reference.clone()),
            Self::UnknownPosition { layer_digest, index } => {
                Self::UnknownPosition { layer_digest: layer_digest.clone(), index: *index }
            }
            Self::UnknownLayer(digest) => Self::UnknownLayer(digest.clone()),
            Self::EntryMissing { layer_digest, index, name } => Self::EntryMissing {
                layer_digest: layer_digest.clone(),
                index: *index,
                name: name.clone(),
            },
            Self::EntryMismatch { expected, found } => {
                Self::EntryMismatch { expected: expected.clone(), found: found.clone() }
            }
            Self::Store(reason) => Self::Store(reason.clone()),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::Source(e) => Self::Source(anyhow::anyhow!("{e:#}")),
        }
    }
}
