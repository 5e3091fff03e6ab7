//! In-memory model of a layered container image filesystem.
//!
//! Layer archives are parsed into per-layer [`FileTree`]s, overlaid with
//! overlay-filesystem semantics into squash views, and indexed by a shared
//! [`FileCatalog`] that serves file contents lazily. An [`Image`] ties the
//! pieces together and can stream every layer's content to observers in a
//! single pass.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod image;
pub mod tree;
pub mod types;

pub use catalog::FileCatalog;
pub use image::{Image, ImageError, ImageOptions, ImageResult};
pub use tree::{FileTree, LinkOption, LinkStatus, Lookup, ResolutionOptions};
pub use types::{FileReference, ReferenceId};
