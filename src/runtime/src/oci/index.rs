//! Image index types.
//!
//! Index entries are parsed leniently: a missing `mediaType` is tolerated and
//! platform sub-fields may be empty, which strict OCI descriptors reject.

use pce_oci_core::media::ANNOTATION_IMAGE_TYPE;
use pce_oci_core::ImageType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level manifest-of-manifests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    #[serde(default)]
    pub schema_version: u32,

    #[serde(default)]
    pub media_type: String,

    #[serde(default)]
    pub manifests: Vec<ManifestDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

/// One entry of an index: a manifest or a nested index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDescriptor {
    #[serde(default)]
    pub media_type: String,

    pub digest: String,

    #[serde(default)]
    pub size: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

impl ManifestDescriptor {
    /// Value of annotation `key`, if any.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    /// The recognized image type marker, or `None` when absent or unknown.
    pub fn image_type(&self) -> Option<ImageType> {
        self.annotation(ANNOTATION_IMAGE_TYPE)?.parse().ok()
    }
}

/// Platform a manifest was built for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    #[serde(default)]
    pub architecture: String,

    #[serde(default)]
    pub os: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}
