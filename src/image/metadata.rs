//! Image metadata and caller-supplied overrides.
//!
//! Overrides are applied in order to the metadata read from the image
//! source. Any failing override aborts the read.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::image::error::MetadataError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Image identity, the digest of the raw config when known.
    pub id: String,
    pub tags: Vec<String>,
    pub media_type: Option<String>,
    pub manifest_digest: Option<String>,
    pub raw_manifest: Option<Vec<u8>>,
    pub raw_config: Option<Vec<u8>>,
    /// Total payload size across all layers, filled in by the read.
    pub size: u64,
}

/// One step of the metadata override chain.
pub trait MetadataOverride: Send + Sync {
    fn apply(&self, metadata: &mut ImageMetadata) -> Result<(), MetadataError>;
}

impl<F> MetadataOverride for F
where
    F: Fn(&mut ImageMetadata) -> Result<(), MetadataError> + Send + Sync,
{
    fn apply(&self, metadata: &mut ImageMetadata) -> Result<(), MetadataError> {
        self(metadata)
    }
}

/// Replace the image tags. Tags are left empty when any tag is invalid.
#[derive(Debug, Clone)]
pub struct WithTags(pub Vec<String>);

impl WithTags {
    pub fn new<S: Into<String>>(tags: impl IntoIterator<Item = S>) -> Self {
        Self(tags.into_iter().map(Into::into).collect())
    }
}

impl MetadataOverride for WithTags {
    fn apply(&self, metadata: &mut ImageMetadata) -> Result<(), MetadataError> {
        if let Some(bad) = self.0.iter().find(|tag| !is_valid_tag(tag)) {
            metadata.tags.clear();
            return Err(MetadataError::InvalidTag(bad.clone()));
        }
        metadata.tags = self.0.clone();
        Ok(())
    }
}

/// Set the raw manifest; the manifest digest is derived from it.
#[derive(Debug, Clone)]
pub struct WithManifest(pub Vec<u8>);

impl MetadataOverride for WithManifest {
    fn apply(&self, metadata: &mut ImageMetadata) -> Result<(), MetadataError> {
        metadata.manifest_digest = Some(sha256_digest(&self.0));
        metadata.raw_manifest = Some(self.0.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WithManifestDigest(pub String);

impl MetadataOverride for WithManifestDigest {
    fn apply(&self, metadata: &mut ImageMetadata) -> Result<(), MetadataError> {
        metadata.manifest_digest = Some(self.0.clone());
        Ok(())
    }
}

/// Set the raw config; the image id is derived from it.
#[derive(Debug, Clone)]
pub struct WithConfig(pub Vec<u8>);

impl MetadataOverride for WithConfig {
    fn apply(&self, metadata: &mut ImageMetadata) -> Result<(), MetadataError> {
        metadata.id = sha256_digest(&self.0);
        metadata.raw_config = Some(self.0.clone());
        Ok(())
    }
}

pub(crate) fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}

/// Loose reference sanity check: `name[:tag]` without whitespace or control
/// characters and with a tag of at most 128 characters.
fn is_valid_tag(tag: &str) -> bool {
    if tag.is_empty() || tag.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    match tag.rsplit_once(':') {
        Some((name, version)) if !version.contains('/') => {
            !name.is_empty()
                && !version.is_empty()
                && version.len() <= 128
                && version.chars().all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c))
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_tags() {
        let mut metadata = ImageMetadata::default();
        WithTags::new(["alpine:3.20", "registry.local:5000/app"]).apply(&mut metadata).unwrap();
        assert_eq!(metadata.tags, vec!["alpine:3.20", "registry.local:5000/app"]);
    }

    #[test]
    fn test_with_tags_invalid_clears() {
        let mut metadata = ImageMetadata { tags: vec!["old".into()], ..Default::default() };
        let err = WithTags::new(["good:1", "bad tag"]).apply(&mut metadata).unwrap_err();
        assert_eq!(err, MetadataError::InvalidTag("bad tag".into()));
        assert!(metadata.tags.is_empty());

        assert!(WithTags::new(["app:"]).apply(&mut metadata).is_err());
        assert!(WithTags::new([""]).apply(&mut metadata).is_err());
    }

    #[test]
    fn test_with_manifest_sets_digest() {
        let mut metadata = ImageMetadata::default();
        WithManifest(b"{}".to_vec()).apply(&mut metadata).unwrap();
        assert_eq!(
            metadata.manifest_digest.as_deref(),
            Some("sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a")
        );
        assert_eq!(metadata.raw_manifest.as_deref(), Some(b"{}".as_slice()));
    }

    #[test]
    fn test_with_manifest_digest() {
        let mut metadata = ImageMetadata::default();
        WithManifestDigest("sha256:abc".into()).apply(&mut metadata).unwrap();
        assert_eq!(metadata.manifest_digest.as_deref(), Some("sha256:abc"));
    }

    #[test]
    fn test_with_config_sets_id() {
        let mut metadata = ImageMetadata::default();
        WithConfig(b"{}".to_vec()).apply(&mut metadata).unwrap();
        assert_eq!(metadata.id, sha256_digest(b"{}"));
        assert!(metadata.raw_config.is_some());
    }

    #[test]
    fn test_closure_override() {
        let mut metadata = ImageMetadata::default();
        let set_media_type = |m: &mut ImageMetadata| -> Result<(), MetadataError> {
            m.media_type = Some("application/vnd.oci.image.manifest.v1+json".into());
            Ok(())
        };
        set_media_type.apply(&mut metadata).unwrap();
        assert!(metadata.media_type.is_some());
    }
}
