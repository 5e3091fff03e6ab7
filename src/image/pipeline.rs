//! Single-pass content distribution.
//!
//! Each layer archive is streamed once on a blocking thread. Every entry is
//! matched back to its catalog record by archive position, its bytes are
//! persisted once, and an independent reader is handed to every interested
//! observer over that observer's own channel. Channels hold one observation,
//! so the producer waits until an observer has taken the previous one.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::archive::{LayerSource, Visit, entry_name, for_each_entry, is_archive_metadata};
use crate::catalog::{ContentReader, FileCatalog, FileCatalogEntry};
use crate::image::error::{PipelineError, PipelineResult};
use crate::types::{FileReference, LayerDigest};

/// One file handed to an observer.
#[derive(Debug)]
pub struct ContentObservation {
    pub entry: FileCatalogEntry,
    pub content: ContentReader,
}

impl ContentObservation {
    pub fn reference(&self) -> &FileReference {
        self.entry.reference()
    }
}

/// Consumer of file contents during [`Image::iterate_content`](super::Image::iterate_content).
#[async_trait]
pub trait ContentObserver: Send + Sync {
    /// Whether this observer wants the content of `reference`.
    fn is_interested_in(&self, reference: &FileReference) -> bool;

    /// Drain observations until the channel closes. Returning early, before
    /// the channel closes, aborts the whole pass.
    async fn observe(&self, observations: mpsc::Receiver<ContentObservation>);
}

/// Archive of one layer, as the producer needs it.
pub(crate) struct LayerArchive {
    pub index: usize,
    pub digest: LayerDigest,
    pub source: Arc<dyn LayerSource>,
}

pub(crate) async fn distribute(
    archives: Vec<LayerArchive>,
    catalog: Arc<FileCatalog>,
    observers: Vec<Arc<dyn ContentObserver>>,
) -> PipelineResult<()> {
    if observers.is_empty() {
        return Err(PipelineError::NoObservers);
    }

    let mut senders = Vec::with_capacity(observers.len());
    let mut tasks = Vec::with_capacity(observers.len());
    for observer in &observers {
        let (tx, rx) = mpsc::channel(1);
        let observer = Arc::clone(observer);
        tasks.push(tokio::spawn(async move { observer.observe(rx).await }));
        senders.push(tx);
    }

    debug!(layers = archives.len(), observers = observers.len(), "Distributing layer content");

    // The senders move into the producer and drop with it, closing every
    // channel on success and on failure alike.
    let produced = tokio::task::spawn_blocking(move || {
        produce(&archives, &catalog, &observers, &senders)
    })
    .await;

    let mut outcome = match produced {
        Ok(result) => result,
        Err(e) => Err(PipelineError::Producer(e.to_string())),
    };

    for (observer, task) in tasks.into_iter().enumerate() {
        if let Err(e) = task.await {
            warn!(observer, error = %e, "Content observer failed");
            if outcome.is_ok() {
                outcome = Err(PipelineError::ObserverFailed { observer, reason: e.to_string() });
            }
        }
    }

    outcome
}

fn produce(
    archives: &[LayerArchive],
    catalog: &FileCatalog,
    observers: &[Arc<dyn ContentObserver>],
    senders: &[mpsc::Sender<ContentObservation>],
) -> PipelineResult<()> {
    for archive in archives {
        let layer = archive.index;
        let reader = archive.source.open().map_err(|source| PipelineError::Open { layer, source })?;
        // Hard link targets are kept while streaming so their links never reopen the archive.
        let linked = catalog.linked_payloads(&archive.digest);

        let mut delivered = 0usize;
        for_each_entry::<_, PipelineError, _>(reader, |index, archived| {
            if is_archive_metadata(archived) {
                return Ok(Visit::Continue);
            }

            let found = entry_name(archived);
            let entry = catalog
                .lookup_by_archive_position(&archive.digest, index)
                .map_err(|_| PipelineError::MissingEntry { layer, index, name: found.clone() })?;
            if found != entry.entry_name() {
                return Err(PipelineError::EntryMismatch {
                    layer,
                    index,
                    expected: entry.entry_name().to_string(),
                    found,
                });
            }

            if linked.contains(&entry.reference().id) {
                catalog.prepare_content(entry.reference(), &mut *archived)?;
            }
            for (observer, (interest, sender)) in observers.iter().zip(senders).enumerate() {
                if !interest.is_interested_in(entry.reference()) {
                    continue;
                }
                // The first call persists the entry bytes; later ones reuse them.
                let content = catalog.prepare_content(entry.reference(), &mut *archived)?;
                sender
                    .blocking_send(ContentObservation { entry: entry.clone(), content })
                    .map_err(|_| PipelineError::ObserverClosed { observer })?;
                delivered += 1;
            }
            Ok(Visit::Continue)
        })
        .map_err(|e| match e {
            PipelineError::Io(source) => PipelineError::Archive { layer, source },
            other => other,
        })?;

        debug!(layer, digest = %archive.digest, delivered, "Distributed layer content");
    }
    Ok(())
}
