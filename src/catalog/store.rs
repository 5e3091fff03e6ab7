//! Content stores: write once, read through any number of independent cursors.
//!
//! Payloads are addressed by their BLAKE3 digest, so identical file bodies
//! coming from different references are kept once.

use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::catalog::error::{CatalogError, CatalogResult};

/// Address of persisted content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHandle {
    /// BLAKE3 digest, hex encoded.
    pub digest: String,
    pub size: u64,
}

impl ContentHandle {
    pub fn of(bytes: &[u8]) -> Self {
        Self { digest: blake3::hash(bytes).to_hex().to_string(), size: bytes.len() as u64 }
    }
}

/// Backing storage for catalog content.
pub trait ContentStore: Send + Sync {
    /// Persist `bytes`, returning their address. Storing the same bytes twice
    /// yields the same handle.
    fn put(&self, bytes: Vec<u8>) -> CatalogResult<ContentHandle>;

    /// A new reader over persisted content, independent of all other readers.
    fn open(&self, handle: &ContentHandle) -> CatalogResult<ContentReader>;
}

/// Keeps payloads in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: DashMap<String, Arc<[u8]>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct payloads held.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl ContentStore for MemoryStore {
    fn put(&self, bytes: Vec<u8>) -> CatalogResult<ContentHandle> {
        let handle = ContentHandle::of(&bytes);
        self.blobs.entry(handle.digest.clone()).or_insert_with(|| bytes.into());
        Ok(handle)
    }

    fn open(&self, handle: &ContentHandle) -> CatalogResult<ContentReader> {
        let blob = self
            .blobs
            .get(&handle.digest)
            .map(|blob| Arc::clone(blob.value()))
            .ok_or_else(|| CatalogError::Store(format!("Missing content {}", handle.digest)))?;
        Ok(ContentReader::shared(blob))
    }
}

/// Spools payloads to files in a directory, one file per digest.
#[derive(Debug, Clone)]
pub struct SpoolStore {
    dir: PathBuf,
}

impl SpoolStore {
    pub fn new(dir: impl Into<PathBuf>) -> CatalogResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            CatalogError::Store(format!("Failed to create spool directory {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        self.dir.join(digest)
    }
}

impl ContentStore for SpoolStore {
    fn put(&self, bytes: Vec<u8>) -> CatalogResult<ContentHandle> {
        let handle = ContentHandle::of(&bytes);
        let path = self.blob_path(&handle.digest);
        if path.exists() {
            return Ok(handle);
        }

        // Each writer gets its own temp file; the rename makes the blob visible whole.
        // Racing writers carry identical bytes, so whichever rename lands last is fine.
        let mut partial = NamedTempFile::new_in(&self.dir)?;
        partial.write_all(&bytes)?;
        partial.persist(&path).map_err(|e| e.error)?;

        tracing::trace!(digest = %handle.digest, size = handle.size, "Spooled content");
        Ok(handle)
    }

    fn open(&self, handle: &ContentHandle) -> CatalogResult<ContentReader> {
        let file = File::open(self.blob_path(&handle.digest)).map_err(|e| {
            CatalogError::Store(format!("Failed to open spooled content {}: {e}", handle.digest))
        })?;
        Ok(ContentReader::file(file))
    }
}

/// Independent read cursor over one file's content.
pub struct ContentReader {
    inner: ReaderInner,
}

enum ReaderInner {
    Empty,
    Shared(Cursor<Arc<[u8]>>),
    File(BufReader<File>),
}

impl ContentReader {
    pub fn empty() -> Self {
        Self { inner: ReaderInner::Empty }
    }

    pub fn shared(bytes: Arc<[u8]>) -> Self {
        Self { inner: ReaderInner::Shared(Cursor::new(bytes)) }
    }

    pub fn file(file: File) -> Self {
        Self { inner: ReaderInner::File(BufReader::new(file)) }
    }

    /// Drain the reader into a vector.
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl Read for ContentReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            ReaderInner::Empty => Ok(0),
            ReaderInner::Shared(cursor) => cursor.read(buf),
            ReaderInner::File(file) => file.read(buf),
        }
    }
}

impl std::fmt::Debug for ContentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            ReaderInner::Empty => "empty",
            ReaderInner::Shared(_) => "memory",
            ReaderInner::File(_) => "file",
        };
        f.debug_struct("ContentReader").field("backing", &kind).finish()
    }
}
