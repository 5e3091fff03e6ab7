use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::archive::{FileLayer, LayerSource};
use crate::image::metadata::{ImageMetadata, sha256_digest};

/// Where an image's metadata and ordered layer archives come from.
pub trait ImageSource: Send + Sync {
    fn metadata(&self) -> Result<ImageMetadata>;

    /// Layer archives, bottom layer first.
    fn layers(&self) -> Result<Vec<Arc<dyn LayerSource>>>;
}

/// An image assembled from an explicit list of layer archives.
///
/// Without a configured id, the id is derived from the ordered layer digests.
#[derive(Default, Clone)]
pub struct LayerStack {
    metadata: ImageMetadata,
    layers: Vec<Arc<dyn LayerSource>>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack of on-disk tar or tar.gz files, in the given order.
    pub fn from_files<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Self> {
        let mut stack = Self::new();
        for path in paths {
            stack = stack.push(FileLayer::new(path)?);
        }
        Ok(stack)
    }

    pub fn push(mut self, layer: impl LayerSource + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn push_shared(mut self, layer: Arc<dyn LayerSource>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn with_metadata(mut self, metadata: ImageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl ImageSource for LayerStack {
    fn metadata(&self) -> Result<ImageMetadata> {
        let mut metadata = self.metadata.clone();
        if metadata.id.is_empty() {
            let digests: Vec<String> = self.layers.iter().map(|layer| layer.digest()).collect();
            metadata.id = sha256_digest(digests.join("\n").as_bytes());
        }
        Ok(metadata)
    }

    fn layers(&self) -> Result<Vec<Arc<dyn LayerSource>>> {
        Ok(self.layers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryLayer;

    #[test]
    fn test_layer_stack_derives_id() {
        let stack = LayerStack::new()
            .push(MemoryLayer::new(Vec::new()).with_digest("sha256:a"))
            .push(MemoryLayer::new(Vec::new()).with_digest("sha256:b"));
        let reversed = LayerStack::new()
            .push(MemoryLayer::new(Vec::new()).with_digest("sha256:b"))
            .push(MemoryLayer::new(Vec::new()).with_digest("sha256:a"));

        let id = stack.metadata().unwrap().id;
        assert!(id.starts_with("sha256:"));
        assert_ne!(id, reversed.metadata().unwrap().id);
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_layer_stack_keeps_explicit_id() {
        let stack = LayerStack::new()
            .with_metadata(ImageMetadata { id: "sha256:fixed".into(), ..Default::default() });
        assert_eq!(stack.metadata().unwrap().id, "sha256:fixed");
        assert!(stack.layers().unwrap().is_empty());
    }

    #[test]
    fn test_from_files_missing() {
        assert!(LayerStack::from_files(["/no/such/layer.tar"]).is_err());
    }
}
