//! Manifest selection from an image index.
//!
//! Precedence, in order:
//! 1. the first recognized candidate whose platform matches the target,
//! 2. the first recognized candidate in declaration order,
//! 3. the first nested index, searched once with the same rules.

use pce_oci_core::error::{ImageError, Result};
use pce_oci_core::media::{MEDIA_TYPE_IMAGE_INDEX, MEDIA_TYPE_IMAGE_MANIFEST};
use pce_oci_core::{ImageType, TargetPlatform};

use super::index::{ImageIndex, ManifestDescriptor, Platform};
use super::layout::ImageLayout;

/// Nested indices are followed at most this many levels below the top-level index.
pub const MAX_NESTED_DEPTH: usize = 1;

/// The manifest descriptor chosen for the target platform.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedManifest {
    pub descriptor: ManifestDescriptor,
    pub image_type: ImageType,
}

/// Picks one manifest descriptor out of an index for a target platform.
pub struct ManifestResolver<'a> {
    layout: &'a ImageLayout,
    platform: &'a TargetPlatform,
}

impl<'a> ManifestResolver<'a> {
    pub fn new(layout: &'a ImageLayout, platform: &'a TargetPlatform) -> Self {
        Self { layout, platform }
    }

    /// Resolve `index` to a single manifest descriptor.
    pub fn resolve(&self, index: &ImageIndex) -> Result<SelectedManifest> {
        self.resolve_at_depth(index, MAX_NESTED_DEPTH)
    }

    fn resolve_at_depth(&self, index: &ImageIndex, depth_left: usize) -> Result<SelectedManifest> {
        let mut candidates = Vec::new();
        let mut first_nested: Option<&ManifestDescriptor> = None;

        for descriptor in &index.manifests {
            match descriptor.media_type.as_str() {
                // An empty media type is tolerated by some tools.
                MEDIA_TYPE_IMAGE_MANIFEST | "" => {
                    if let Some(image_type) = descriptor.image_type() {
                        candidates.push(SelectedManifest {
                            descriptor: descriptor.clone(),
                            image_type,
                        });
                    }
                }
                MEDIA_TYPE_IMAGE_INDEX => {
                    if first_nested.is_none() {
                        first_nested = Some(descriptor);
                    }
                }
                _ => {}
            }
        }

        if let Some(position) = candidates.iter().position(|c| {
            matches_platform(
                c.descriptor.platform.as_ref(),
                &self.platform.os,
                &self.platform.architecture,
            )
        }) {
            let selected = candidates.swap_remove(position);
            tracing::debug!(
                digest = %selected.descriptor.digest,
                platform = %self.platform,
                "Selected manifest by platform"
            );
            return Ok(selected);
        }

        if !candidates.is_empty() {
            let selected = candidates.swap_remove(0);
            tracing::debug!(
                digest = %selected.descriptor.digest,
                platform = %self.platform,
                "No platform match, falling back to first candidate"
            );
            return Ok(selected);
        }

        if let (Some(nested), true) = (first_nested, depth_left > 0) {
            tracing::debug!(digest = %nested.digest, "Descending into nested index");
            let nested_index: ImageIndex = self.layout.read_blob_json(&nested.digest)?;
            return self.resolve_at_depth(&nested_index, depth_left - 1);
        }

        Err(ImageError::ManifestSelectionError(
            "no suitable manifest descriptor found".to_string(),
        ))
    }
}

/// Whether `platform` is compatible with `os`/`architecture`.
///
/// An absent platform matches anything; empty sub-fields match any value.
/// Comparison is case-insensitive.
pub fn matches_platform(platform: Option<&Platform>, os: &str, architecture: &str) -> bool {
    let Some(platform) = platform else {
        return true;
    };
    if !platform.os.is_empty() && !platform.os.eq_ignore_ascii_case(os) {
        return false;
    }
    if !platform.architecture.is_empty() && !platform.architecture.eq_ignore_ascii_case(architecture)
    {
        return false;
    }
    true
}
