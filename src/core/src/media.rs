//! Media types, annotation keys and whiteout markers understood by pce-oci.

use serde::{Deserialize, Serialize};

/// OCI image index media type.
pub const MEDIA_TYPE_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
/// OCI image manifest media type.
pub const MEDIA_TYPE_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
/// OCI image config media type.
pub const MEDIA_TYPE_IMAGE_CONFIG: &str = "application/vnd.oci.image.config.v1+json";

/// Supported image layout version (`oci-layout` file).
pub const IMAGE_LAYOUT_VERSION: &str = "1.0.0";
/// Name of the layout marker file.
pub const IMAGE_LAYOUT_FILE: &str = "oci-layout";
/// Name of the index file.
pub const IMAGE_INDEX_FILE: &str = "index.json";
/// Root of the content-addressed blob store.
pub const IMAGE_BLOBS_DIR: &str = "blobs";

/// Manifest descriptor annotation carrying the [`ImageType`].
pub const ANNOTATION_IMAGE_TYPE: &str = "org.pextra.image.type";

/// qcow2 disk-image layer.
pub const MEDIA_TYPE_LAYER_QCOW2: &str = "application/vnd.pextra.image.layer.v1.qcow2";
/// Logical on-disk filename of a qcow2 layer (backing references resolve by this name).
pub const ANNOTATION_QEMU_FILE_NAME: &str = "org.pextra.qcow2.fileName";
/// Only the literal `"true"` enables flattening.
pub const ANNOTATION_QEMU_FLATTEN: &str = "org.pextra.qcow2.flatten";

/// Uncompressed LXC rootfs layer.
pub const MEDIA_TYPE_LAYER_LXC: &str = "application/vnd.pextra.image.layer.v1.lxc.tar";
/// Gzip-compressed LXC rootfs layer.
pub const MEDIA_TYPE_LAYER_LXC_GZIP: &str = "application/vnd.pextra.image.layer.v1.lxc.tar+gzip";
/// Zstd-compressed LXC rootfs layer.
pub const MEDIA_TYPE_LAYER_LXC_ZSTD: &str = "application/vnd.pextra.image.layer.v1.lxc.tar+zstd";

/// All LXC layer variants, in no particular order.
pub const LXC_LAYER_MEDIA_TYPES: [&str; 3] = [
    MEDIA_TYPE_LAYER_LXC,
    MEDIA_TYPE_LAYER_LXC_GZIP,
    MEDIA_TYPE_LAYER_LXC_ZSTD,
];

/// Entry name marking its parent directory as opaque.
pub const OPAQUE_DIR_MARKER: &str = ".wh..wh..opq";
/// Prefix marking a sibling entry as deleted.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Kind of image a manifest describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    /// VM image made of a qcow2 backing chain.
    Qemu,
    /// Container image made of rootfs tarballs.
    Lxc,
}

impl ImageType {
    /// Annotation value for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qemu => "qemu",
            Self::Lxc => "lxc",
        }
    }
}

impl std::fmt::Display for ImageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "qemu" => Ok(Self::Qemu),
            "lxc" => Ok(Self::Lxc),
            _ => Err(format!("unknown image type: '{}' (supported: qemu, lxc)", s)),
        }
    }
}
