//! Layer descriptor helpers.
//!
//! Layer order in a manifest is chain order (index 0 is the bottom layer);
//! nothing here reorders it.

use oci_spec::image::Descriptor;
use pce_oci_core::error::{ImageError, Result};
use pce_oci_core::media::{
    MEDIA_TYPE_LAYER_LXC, MEDIA_TYPE_LAYER_LXC_GZIP, MEDIA_TYPE_LAYER_LXC_ZSTD,
};

/// Return the layers whose media type is one of `media_types`, order preserved.
///
/// An empty `media_types` selects nothing.
pub fn select_layers(layers: &[Descriptor], media_types: &[&str]) -> Vec<Descriptor> {
    layers
        .iter()
        .filter(|layer| {
            let media_type = layer.media_type().to_string();
            media_types.iter().any(|m| *m == media_type)
        })
        .cloned()
        .collect()
}

/// Value of annotation `key` on `descriptor`, if any.
pub fn annotation<'a>(descriptor: &'a Descriptor, key: &str) -> Option<&'a str> {
    descriptor
        .annotations()
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

/// Compression of an LXC layer tarball.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerCompression {
    None,
    Gzip,
    Zstd,
}

impl LayerCompression {
    /// Compression implied by an LXC layer media type.
    pub fn from_media_type(media_type: &str) -> Result<Self> {
        match media_type {
            MEDIA_TYPE_LAYER_LXC => Ok(Self::None),
            MEDIA_TYPE_LAYER_LXC_GZIP => Ok(Self::Gzip),
            MEDIA_TYPE_LAYER_LXC_ZSTD => Ok(Self::Zstd),
            other => Err(ImageError::UnsupportedMediaType {
                kind: "LXC layer".to_string(),
                media_type: other.to_string(),
            }),
        }
    }

    /// Decompression flag understood by GNU tar.
    pub fn tar_flag(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Gzip => Some("--gzip"),
            Self::Zstd => Some("--zstd"),
        }
    }
}
