//! In-memory file trees for layers and their squashed views.
//!
//! This module provides:
//! - Path normalization for archive entry names and link targets
//! - File nodes and deletion markers
//! - The path-indexed [`FileTree`]
//! - Union squash with overlay-filesystem semantics
//! - Symlink and hard link resolution

mod error;
mod file_tree;
mod node;
pub mod path;
mod resolver;
mod union;

pub use error::{TreeError, TreeResult};
pub use file_tree::FileTree;
pub use node::{FileNode, NodeKind, NodeMetadata, OPAQUE_WHITEOUT, WHITEOUT_PREFIX, marker_kind};
pub use resolver::{DEFAULT_MAX_LINK_HOPS, LinkOption, LinkStatus, Lookup, ResolutionOptions};
pub use union::{squash, union};
