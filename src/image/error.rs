use std::io;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::tree::TreeError;

pub type ImageResult<T> = Result<T, ImageError>;
pub type LayerResult<T> = Result<T, LayerError>;
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while parsing one layer archive.
#[derive(Error, Debug)]
pub enum LayerError {
    #[error("Failed to open archive for layer {layer}: {source}")]
    Open { layer: usize, source: anyhow::Error },

    #[error("Layer {layer} entry {index} ({name}): {reason}")]
    Entry { layer: usize, index: usize, name: String, reason: String },

    #[error("Layer {layer} entry {index} ({name}) has unsupported type {entry_type}")]
    UnsupportedEntry { layer: usize, index: usize, name: String, entry_type: String },

    #[error("Failed to read archive for layer {layer}: {source}")]
    Archive { layer: usize, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Errors raised by the content distribution pass.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No content observers provided")]
    NoObservers,

    #[error("Failed to open archive for layer {layer}: {source}")]
    Open { layer: usize, source: anyhow::Error },

    #[error("Layer {layer} entry {index} ({name}) has no catalog entry")]
    MissingEntry { layer: usize, index: usize, name: String },

    #[error("Layer {layer} entry {index}: mismatched archive entry names: {found:?} != {expected:?}")]
    EntryMismatch { layer: usize, index: usize, expected: String, found: String },

    #[error("Observer {observer} stopped receiving content")]
    ObserverClosed { observer: usize },

    #[error("Observer {observer} failed: {reason}")]
    ObserverFailed { observer: usize, reason: String },

    #[error("Content producer failed: {0}")]
    Producer(String),

    #[error("Failed to read archive for layer {layer}: {source}")]
    Archive { layer: usize, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Errors raised while applying metadata overrides.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Invalid tag: {0:?}")]
    InvalidTag(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image has not been read")]
    NotRead,

    #[error("Image has already been read")]
    AlreadyRead,

    #[error("Failed to read image source: {0}")]
    Source(anyhow::Error),

    #[error("Unable to override metadata option: {0}")]
    Override(#[from] MetadataError),

    #[error("Layer index {index} out of range ({count} layers)")]
    LayerOutOfRange { index: usize, count: usize },

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Content pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_entry_error() {
        let err = LayerError::Entry {
            layer: 1,
            index: 4,
            name: "../etc/shadow".into(),
            reason: "Path escapes root".into(),
        };
        assert_eq!(err.to_string(), "Layer 1 entry 4 (../etc/shadow): Path escapes root");
    }

    #[test]
    fn test_pipeline_no_observers_error() {
        assert_eq!(PipelineError::NoObservers.to_string(), "No content observers provided");
    }

    #[test]
    fn test_entry_mismatch_error() {
        let err = PipelineError::EntryMismatch {
            layer: 0,
            index: 2,
            expected: "etc/a".into(),
            found: "etc/b".into(),
        };
        assert_eq!(
            err.to_string(),
            "Layer 0 entry 2: mismatched archive entry names: \"etc/b\" != \"etc/a\""
        );
    }

    #[test]
    fn test_image_error_wraps_override() {
        let err: ImageError = MetadataError::InvalidTag("".into()).into();
        assert_eq!(err.to_string(), "Unable to override metadata option: Invalid tag: \"\"");
    }

    #[test]
    fn test_layer_out_of_range_error() {
        let err = ImageError::LayerOutOfRange { index: 3, count: 2 };
        assert_eq!(err.to_string(), "Layer index 3 out of range (2 layers)");
    }
}
