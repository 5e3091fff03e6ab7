//! Layer archive access.
//!
//! A [`LayerSource`] hands out fresh, single-pass readers over one layer's
//! uncompressed tar stream. Gzip-compressed layers are decoded transparently.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use sha2::{Digest, Sha256};

use crate::types::LayerDigest;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Accessor for one layer's raw archive.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait LayerSource: Send + Sync {
    /// Content digest identifying the layer.
    fn digest(&self) -> LayerDigest;

    /// Open a new reader positioned at the first archive entry.
    fn open(&self) -> Result<Box<dyn Read + Send>>;
}

/// Layer archive held in memory.
#[derive(Debug, Clone)]
pub struct MemoryLayer {
    digest: LayerDigest,
    bytes: Arc<[u8]>,
}

impl MemoryLayer {
    /// Wrap tar (or tar.gz) bytes; the digest is the sha256 of the bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        let digest = format!("sha256:{:x}", Sha256::digest(&bytes));
        Self { digest, bytes: bytes.into() }
    }

    pub fn with_digest(mut self, digest: impl Into<LayerDigest>) -> Self {
        self.digest = digest.into();
        self
    }
}

impl LayerSource for MemoryLayer {
    fn digest(&self) -> LayerDigest {
        self.digest.clone()
    }

    fn open(&self) -> Result<Box<dyn Read + Send>> {
        Ok(decode(io::Cursor::new(Arc::clone(&self.bytes)))?)
    }
}

/// Layer archive stored in a local file.
#[derive(Debug, Clone)]
pub struct FileLayer {
    path: PathBuf,
    digest: LayerDigest,
}

impl FileLayer {
    /// Open `path` once to compute its digest.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)
            .with_context(|| format!("Failed to open layer file {}", path.display()))?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)
            .with_context(|| format!("Failed to hash layer file {}", path.display()))?;
        let digest = format!("sha256:{:x}", hasher.finalize());

        tracing::debug!(layer = %path.display(), digest = %digest, "Registered layer file");

        Ok(Self { path, digest })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LayerSource for FileLayer {
    fn digest(&self) -> LayerDigest {
        self.digest.clone()
    }

    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open layer file {}", self.path.display()))?;
        Ok(decode(file)?)
    }
}

/// Wrap `reader` in a gzip decoder when the stream starts with the gzip magic.
fn decode<R: Read + Send + 'static>(reader: R) -> io::Result<Box<dyn Read + Send>> {
    let mut buffered = BufReader::new(reader);
    let is_gzip = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip { Ok(Box::new(GzDecoder::new(buffered))) } else { Ok(Box::new(buffered)) }
}

/// Whether the visitor wants more entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Stop,
}

/// Walk the entries of a tar stream in archive order.
///
/// Entry indices count the entries yielded by the tar reader (extension
/// headers are folded into the entry they describe), so they are stable
/// between two passes over the same archive.
pub fn for_each_entry<R, E, F>(reader: R, mut visit: F) -> Result<(), E>
where
    R: Read,
    E: From<io::Error>,
    F: FnMut(usize, &mut tar::Entry<'_, R>) -> Result<Visit, E>,
{
    let mut archive = tar::Archive::new(reader);
    for (index, entry) in archive.entries()?.enumerate() {
        let mut entry = entry?;
        if visit(index, &mut entry)? == Visit::Stop {
            break;
        }
    }
    Ok(())
}

/// Raw entry name as recorded in the archive header.
pub fn entry_name<R: Read>(entry: &tar::Entry<'_, R>) -> String {
    String::from_utf8_lossy(&entry.path_bytes()).into_owned()
}

/// Global pax headers describe the archive itself rather than a file.
pub fn is_archive_metadata<R: Read>(entry: &tar::Entry<'_, R>) -> bool {
    matches!(entry.header().entry_type(), tar::EntryType::XGlobalHeader)
}

/// Raw link target of a symlink or hard link entry.
pub fn entry_link_name<R: Read>(entry: &tar::Entry<'_, R>) -> Option<String> {
    entry.link_name_bytes().map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
