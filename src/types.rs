//! Identity types shared by trees, the catalog and the image.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REFERENCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-local, monotonically increasing identifier of one file instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceId(u64);

impl ReferenceId {
    /// Mint a new identifier, never handed out before in this process.
    pub fn next() -> Self {
        Self(NEXT_REFERENCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref:{}", self.0)
    }
}

/// A handle to one file as introduced by one specific layer.
///
/// Two references with the same `real_path` are different files when their ids
/// differ: the same path may be recreated with other content by a later layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileReference {
    pub id: ReferenceId,
    pub real_path: String,
}

impl FileReference {
    /// Create a reference with a freshly minted id.
    pub fn new(real_path: impl Into<String>) -> Self {
        Self { id: ReferenceId::next(), real_path: real_path.into() }
    }
}

impl fmt::Display for FileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.real_path, self.id)
    }
}

/// Digest of a layer archive, e.g. `sha256:…`.
pub type LayerDigest = String;
