//! File catalog: the index from file reference to metadata and content.
//!
//! Content is fetched from the layer archive at most once per payload and
//! kept in a [`ContentStore`]. Concurrent first requests for one payload wait
//! on a single fetch; unrelated payloads are fetched independently.

mod entry;
mod error;
mod store;

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use moka::sync::Cache;
use tracing::debug;

use crate::archive::{LayerSource, Visit, entry_name, for_each_entry};
use crate::types::{FileReference, LayerDigest, ReferenceId};

pub use entry::FileCatalogEntry;
pub use error::{CatalogError, CatalogResult};
pub use store::{ContentHandle, ContentReader, ContentStore, MemoryStore, SpoolStore};

pub struct FileCatalog {
    entries: DashMap<ReferenceId, FileCatalogEntry>,
    positions: DashMap<(LayerDigest, usize), ReferenceId>,
    sources: DashMap<LayerDigest, Arc<dyn LayerSource>>,
    contents: Cache<ReferenceId, ContentHandle>,
    store: Arc<dyn ContentStore>,
}

impl Default for FileCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl FileCatalog {
    /// Catalog keeping content in memory.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn ContentStore>) -> Self {
        Self {
            entries: DashMap::new(),
            positions: DashMap::new(),
            sources: DashMap::new(),
            contents: Cache::builder().name("layerscope-content").build(),
            store,
        }
    }

    /// Record the archive accessor used for lazy content fetches.
    pub fn register_source(&self, source: Arc<dyn LayerSource>) {
        self.sources.insert(source.digest(), source);
    }

    /// Record an entry. Registering the same reference twice is an error.
    pub fn register(&self, entry: FileCatalogEntry) -> CatalogResult<()> {
        let position = (entry.layer_digest.clone(), entry.archive_index);
        let id = entry.reference().id;

        match self.entries.entry(id) {
            Entry::Occupied(_) => {
                return Err(CatalogError::DuplicateReference(entry.reference().clone()));
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
        }
        self.positions.insert(position, id);
        Ok(())
    }

    pub fn get(&self, reference: &FileReference) -> Option<FileCatalogEntry> {
        self.entries.get(&reference.id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, reference: &FileReference) -> bool {
        self.entries.contains_key(&reference.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All registered references, in registration order.
    pub fn references(&self) -> Vec<FileReference> {
        let mut references: Vec<FileReference> =
            self.entries.iter().map(|entry| entry.reference().clone()).collect();
        references.sort_by_key(|reference| reference.id);
        references
    }

    /// Payloads that hard links in `layer_digest` share with another entry.
    pub fn linked_payloads(&self, layer_digest: &str) -> HashSet<ReferenceId> {
        self.entries
            .iter()
            .filter(|entry| entry.layer_digest == layer_digest)
            .filter_map(|entry| {
                let payload = entry.payload.as_ref()?;
                (payload.id != entry.reference().id).then_some(payload.id)
            })
            .collect()
    }

    /// Match a raw archive entry back to its catalog record.
    pub fn lookup_by_archive_position(
        &self,
        layer_digest: &str,
        index: usize,
    ) -> CatalogResult<FileCatalogEntry> {
        self.positions
            .get(&(layer_digest.to_string(), index))
            .and_then(|id| self.entries.get(id.value()).map(|entry| entry.value().clone()))
            .ok_or_else(|| CatalogError::UnknownPosition {
                layer_digest: layer_digest.to_string(),
                index,
            })
    }

    /// File bytes for `reference`, reading the layer archive at most once.
    pub fn content(&self, reference: &FileReference) -> CatalogResult<ContentReader> {
        let entry =
            self.get(reference).ok_or_else(|| CatalogError::UnknownReference(reference.clone()))?;
        let Some(payload) = entry.payload else {
            return Ok(ContentReader::empty());
        };

        let handle = self
            .contents
            .try_get_with(payload.id, || self.fetch(&payload))
            .map_err(CatalogError::from_shared)?;
        self.store.open(&handle)
    }

    /// Contents for several references; any failure fails the whole request.
    pub fn multiple_content(
        &self,
        references: &[FileReference],
    ) -> CatalogResult<HashMap<FileReference, ContentReader>> {
        references
            .iter()
            .map(|reference| Ok((reference.clone(), self.content(reference)?)))
            .collect()
    }

    /// Persist the bytes of `reference` from a live archive reader.
    ///
    /// `raw` is the entry's own reader and can be consumed once, so the bytes
    /// are stored before a cursor is handed back. When the content is already
    /// cached `raw` is left untouched.
    pub fn prepare_content(
        &self,
        reference: &FileReference,
        raw: &mut dyn Read,
    ) -> CatalogResult<ContentReader> {
        let entry =
            self.get(reference).ok_or_else(|| CatalogError::UnknownReference(reference.clone()))?;
        let Some(payload) = entry.payload else {
            return Ok(ContentReader::empty());
        };
        if payload.id != reference.id {
            // Hard link: the bytes live under the target's archive entry.
            return self.content(&payload);
        }

        let handle = self
            .contents
            .try_get_with(payload.id, || -> CatalogResult<ContentHandle> {
                let mut bytes = Vec::new();
                raw.read_to_end(&mut bytes)?;
                self.store.put(bytes)
            })
            .map_err(CatalogError::from_shared)?;
        self.store.open(&handle)
    }

    fn fetch(&self, payload: &FileReference) -> CatalogResult<ContentHandle> {
        let entry =
            self.get(payload).ok_or_else(|| CatalogError::UnknownReference(payload.clone()))?;
        let source = self
            .sources
            .get(&entry.layer_digest)
            .map(|source| Arc::clone(source.value()))
            .ok_or_else(|| CatalogError::UnknownLayer(entry.layer_digest.clone()))?;

        debug!(
            path = %payload.real_path,
            layer = %entry.layer_digest,
            index = entry.archive_index,
            "Fetching content from layer archive"
        );

        let mut handle = None;
        for_each_entry::<_, CatalogError, _>(source.open()?, |index, archived| {
            if index < entry.archive_index {
                return Ok(Visit::Continue);
            }
            let found = entry_name(archived);
            if found != entry.entry_name() {
                return Err(CatalogError::EntryMismatch {
                    expected: entry.entry_name().to_string(),
                    found,
                });
            }
            let mut bytes = Vec::new();
            archived.read_to_end(&mut bytes)?;
            handle = Some(self.store.put(bytes)?);
            Ok(Visit::Stop)
        })?;

        handle.ok_or_else(|| CatalogError::EntryMissing {
            layer_digest: entry.layer_digest.clone(),
            index: entry.archive_index,
            name: entry.entry_name().to_string(),
        })
    }
}
