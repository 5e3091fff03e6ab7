//! Container image: ordered layers, their squash views and a shared catalog.
//!
//! An [`Image`] is created empty and populated by one [`Image::read`]: the
//! metadata is fetched and overridden, every layer archive is parsed in
//! order, and each layer's cumulative squash tree is computed. Afterwards the
//! image is read-only; only the catalog's content cache still fills in.

mod error;
mod layer;
mod metadata;
mod pipeline;
mod progress;
mod source;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::{ContentReader, ContentStore, FileCatalog, MemoryStore, SpoolStore};
use crate::config::Config;
use crate::tree::{
    DEFAULT_MAX_LINK_HOPS, FileTree, LinkOption, Lookup, NodeKind, ResolutionOptions, union,
};
use crate::types::FileReference;

pub use error::{
    ImageError, ImageResult, LayerError, LayerResult, MetadataError, PipelineError, PipelineResult,
};
pub use layer::{Layer, LayerMetadata};
pub use metadata::{
    ImageMetadata, MetadataOverride, WithConfig, WithManifest, WithManifestDigest, WithTags,
};
pub use pipeline::{ContentObservation, ContentObserver};
pub use progress::ReadProgress;
pub use source::{ImageSource, LayerStack};

use pipeline::LayerArchive;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOptions {
    /// Hop bound for link resolution.
    pub max_link_hops: usize,
    /// Spool directory for file content; in memory when unset.
    pub spool_dir: Option<PathBuf>,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self { max_link_hops: DEFAULT_MAX_LINK_HOPS, spool_dir: None }
    }
}

impl ImageOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_link_hops: config.resolve.max_link_depth,
            spool_dir: config.content.spool_dir.clone(),
        }
    }
}

pub struct Image {
    source: Arc<dyn ImageSource>,
    options: ImageOptions,
    overrides: Vec<Box<dyn MetadataOverride>>,
    store: Arc<dyn ContentStore>,
    catalog: Arc<FileCatalog>,
    metadata: ImageMetadata,
    layers: Vec<Layer>,
    empty: FileTree,
    progress: ReadProgress,
    ready: bool,
}

impl Image {
    pub fn new(source: Arc<dyn ImageSource>, options: ImageOptions) -> ImageResult<Self> {
        let store: Arc<dyn ContentStore> = match &options.spool_dir {
            Some(dir) => Arc::new(SpoolStore::new(dir)?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self {
            source,
            options,
            overrides: Vec::new(),
            catalog: Arc::new(FileCatalog::with_store(Arc::clone(&store))),
            store,
            metadata: ImageMetadata::default(),
            layers: Vec::new(),
            empty: FileTree::new(),
            progress: ReadProgress::new()?,
            ready: false,
        })
    }

    /// Append a metadata override, applied after those already added.
    pub fn with_override(mut self, metadata_override: impl MetadataOverride + 'static) -> Self {
        self.overrides.push(Box::new(metadata_override));
        self
    }

    /// Parse every layer and compute the squash views.
    ///
    /// A failed read leaves the image unread; it may be read again.
    pub fn read(&mut self) -> ImageResult<()> {
        if self.ready {
            return Err(ImageError::AlreadyRead);
        }

        let mut metadata = self.source.metadata().map_err(ImageError::Source)?;
        for metadata_override in &self.overrides {
            metadata_override.apply(&mut metadata)?;
        }
        let sources = self.source.layers().map_err(ImageError::Source)?;

        info!(id = %metadata.id, tags = ?metadata.tags, layers = sources.len(), "Reading image");
        self.progress.start(sources.len());

        let catalog = Arc::new(FileCatalog::with_store(Arc::clone(&self.store)));
        let mut layers = Vec::with_capacity(sources.len());
        metadata.size = 0;
        for (index, source) in sources.into_iter().enumerate() {
            let layer = Layer::read(index, source, &catalog)?;
            metadata.size += layer.size();
            self.progress.layer_read();
            layers.push(layer);
        }

        squash_layers(&mut layers, &self.progress);

        info!(
            id = %metadata.id,
            size = metadata.size,
            files = catalog.len(),
            "Image read"
        );
        self.catalog = catalog;
        self.layers = layers;
        self.metadata = metadata;
        self.ready = true;
        Ok(())
    }

    /// Filesystem view after all layers. Empty for an image without layers.
    pub fn squashed_tree(&self) -> ImageResult<&FileTree> {
        self.ensure_ready()?;
        Ok(self.layers.last().map_or(&self.empty, Layer::squashed_tree))
    }

    /// Content at `path` in the image squash, following links. `None` when
    /// the path is absent or resolves to a link that goes nowhere.
    pub fn file_contents_from_squash(&self, path: &str) -> ImageResult<Option<ContentReader>> {
        let Some(reference) = self.resolve_path(path)? else {
            return Ok(None);
        };
        Ok(Some(self.catalog.content(&reference)?))
    }

    /// Contents for several squash paths; an absent path fails the request.
    pub fn multiple_file_contents_from_squash(
        &self,
        paths: &[&str],
    ) -> ImageResult<HashMap<FileReference, ContentReader>> {
        let references = paths
            .iter()
            .map(|path| {
                self.resolve_path(path)?.ok_or_else(|| ImageError::PathNotFound(path.to_string()))
            })
            .collect::<ImageResult<Vec<_>>>()?;
        Ok(self.catalog.multiple_content(&references)?)
    }

    /// Content of a reference from any layer. `None` for unknown references.
    pub fn file_contents_by_ref(&self, reference: &FileReference) -> ImageResult<Option<ContentReader>> {
        self.ensure_ready()?;
        if !self.catalog.contains(reference) {
            return Ok(None);
        }
        Ok(Some(self.catalog.content(reference)?))
    }

    pub fn multiple_file_contents_by_ref(
        &self,
        references: &[FileReference],
    ) -> ImageResult<HashMap<FileReference, ContentReader>> {
        self.ensure_ready()?;
        Ok(self.catalog.multiple_content(references)?)
    }

    /// Resolve `reference` against the squash view of layer `layer`.
    pub fn resolve_link_by_layer_squash(
        &self,
        reference: &FileReference,
        layer: usize,
        options: &[LinkOption],
    ) -> ImageResult<Option<Lookup>> {
        self.ensure_ready()?;
        let tree = self
            .layers
            .get(layer)
            .map(Layer::squashed_tree)
            .ok_or(ImageError::LayerOutOfRange { index: layer, count: self.layers.len() })?;
        Ok(tree.lookup(&reference.real_path, &self.resolution(options))?)
    }

    /// Resolve `reference` against the image squash view.
    pub fn resolve_link_by_image_squash(
        &self,
        reference: &FileReference,
        options: &[LinkOption],
    ) -> ImageResult<Option<Lookup>> {
        let tree = self.squashed_tree()?;
        Ok(tree.lookup(&reference.real_path, &self.resolution(options))?)
    }

    /// Every tag followed by the image id.
    pub fn ids(&self) -> Vec<String> {
        let mut ids = self.metadata.tags.clone();
        if !self.metadata.id.is_empty() {
            ids.push(self.metadata.id.clone());
        }
        ids
    }

    pub fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn catalog(&self) -> &Arc<FileCatalog> {
        &self.catalog
    }

    pub fn progress(&self) -> &ReadProgress {
        &self.progress
    }

    pub fn options(&self) -> &ImageOptions {
        &self.options
    }

    pub fn is_read(&self) -> bool {
        self.ready
    }

    /// Stream every layer archive once, handing file contents to observers.
    ///
    /// Each observer gets its own channel holding a single observation: the
    /// producer blocks until the observer has taken the previous one, so a
    /// slow observer slows the whole pass. Observations arrive in layer order
    /// then archive order; each entry goes to interested observers in the
    /// order they were passed. All channels close when the pass ends, and
    /// this returns only after every observer has finished.
    pub async fn iterate_content(&self, observers: Vec<Arc<dyn ContentObserver>>) -> ImageResult<()> {
        self.ensure_ready()?;
        let archives = self
            .layers
            .iter()
            .map(|layer| LayerArchive {
                index: layer.index(),
                digest: layer.digest().to_string(),
                source: Arc::clone(layer.source()),
            })
            .collect();
        pipeline::distribute(archives, Arc::clone(&self.catalog), observers).await?;
        Ok(())
    }

    fn ensure_ready(&self) -> ImageResult<()> {
        if self.ready { Ok(()) } else { Err(ImageError::NotRead) }
    }

    /// Basename links are always followed; `options` add to that.
    fn resolution(&self, options: &[LinkOption]) -> ResolutionOptions {
        ResolutionOptions::following_links()
            .with_all(options.iter().copied())
            .with_max_hops(self.options.max_link_hops)
    }

    /// Reference holding the content at a squash path, if any.
    fn resolve_path(&self, path: &str) -> ImageResult<Option<FileReference>> {
        let tree = self.squashed_tree()?;
        let lookup = tree.lookup(path, &self.resolution(&[]))?;
        // A symlink still standing after resolution points nowhere usable.
        Ok(lookup
            .filter(|lookup| lookup.resolved.kind != NodeKind::Symlink)
            .map(|lookup| lookup.resolved.reference))
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("id", &self.metadata.id)
            .field("layers", &self.layers)
            .field("ready", &self.ready)
            .finish()
    }
}

/// Fill in every layer's cumulative squash tree, bottom layer first.
fn squash_layers(layers: &mut [Layer], progress: &ReadProgress) {
    let mut previous = FileTree::new();
    for layer in layers.iter_mut() {
        let squashed = union(&previous, layer.tree());
        debug!(layer = layer.index(), nodes = squashed.len(), "Squashed layer");
        previous = squashed.clone();
        layer.set_squashed_tree(squashed);
        progress.layer_squashed();
    }
}
