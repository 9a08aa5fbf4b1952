//! Resolved OCI image.
//!
//! Loads an image layout, selects the manifest for the target platform and
//! reads its configuration.

use oci_spec::image::{Descriptor, ImageManifest};
use pce_oci_core::error::{ImageError, Result};
use pce_oci_core::media::{
    IMAGE_LAYOUT_VERSION, MEDIA_TYPE_IMAGE_CONFIG, MEDIA_TYPE_IMAGE_INDEX,
    MEDIA_TYPE_IMAGE_MANIFEST,
};
use pce_oci_core::{ImageType, TargetPlatform};
use std::path::{Path, PathBuf};

use super::config::ImageConfig;
use super::index::{ImageIndex, ManifestDescriptor};
use super::layout::ImageLayout;
use super::resolve::ManifestResolver;

/// An image whose manifest has been selected for one platform.
#[derive(Debug)]
pub struct ResolvedImage {
    /// Root directory of the OCI image layout
    path: PathBuf,

    /// Declared `imageLayoutVersion`
    layout_version: String,

    /// Image type taken from the selected descriptor
    image_type: ImageType,

    /// Top-level image index
    index: ImageIndex,

    /// Descriptor chosen by the resolver
    selected_descriptor: ManifestDescriptor,

    /// Selected manifest
    manifest: ImageManifest,

    /// Image configuration
    config: ImageConfig,
}

impl ResolvedImage {
    /// Load the image at `path` and resolve it for `platform`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The directory, `oci-layout` or `index.json` is missing or invalid
    /// - The layout version or a media type is not supported
    /// - No manifest suits the platform
    /// - The manifest or config blob cannot be read
    pub fn load(path: impl AsRef<Path>, platform: &TargetPlatform) -> Result<Self> {
        let layout = ImageLayout::open(path)?;

        let layout_version = layout.read_layout_version()?;
        if layout_version != IMAGE_LAYOUT_VERSION {
            return Err(ImageError::LayoutError(format!(
                "unsupported layout version {:?} (want {:?})",
                layout_version, IMAGE_LAYOUT_VERSION
            )));
        }

        let index = layout.read_index()?;
        if index.media_type != MEDIA_TYPE_IMAGE_INDEX {
            return Err(ImageError::UnsupportedMediaType {
                kind: "index".to_string(),
                media_type: index.media_type.clone(),
            });
        }
        if index.manifests.is_empty() {
            return Err(ImageError::ManifestSelectionError(
                "index contains no manifests".to_string(),
            ));
        }

        let selected = ManifestResolver::new(&layout, platform).resolve(&index)?;
        let digest = selected.descriptor.digest.clone();

        let manifest: ImageManifest = layout.read_blob_json(&digest)?;
        let manifest_media_type = manifest
            .media_type()
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_default();
        if manifest_media_type != MEDIA_TYPE_IMAGE_MANIFEST {
            return Err(ImageError::UnsupportedMediaType {
                kind: "manifest".to_string(),
                media_type: manifest_media_type,
            });
        }

        let config_media_type = manifest.config().media_type().to_string();
        if config_media_type != MEDIA_TYPE_IMAGE_CONFIG {
            return Err(ImageError::UnsupportedMediaType {
                kind: "config".to_string(),
                media_type: config_media_type,
            });
        }
        let config: ImageConfig = layout.read_blob_json(&manifest.config().digest().to_string())?;

        tracing::info!(
            image = %layout.root().display(),
            manifest = %digest,
            image_type = %selected.image_type,
            layers = manifest.layers().len(),
            "Resolved image"
        );

        Ok(Self {
            path: layout.root().to_path_buf(),
            layout_version,
            image_type: selected.image_type,
            index,
            selected_descriptor: selected.descriptor,
            manifest,
            config,
        })
    }

    /// Root directory of the image layout.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Declared layout version.
    pub fn layout_version(&self) -> &str {
        &self.layout_version
    }

    /// Image type of the selected manifest.
    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    /// Top-level image index.
    pub fn index(&self) -> &ImageIndex {
        &self.index
    }

    /// Descriptor the resolver selected.
    pub fn selected_descriptor(&self) -> &ManifestDescriptor {
        &self.selected_descriptor
    }

    /// Selected manifest.
    pub fn manifest(&self) -> &ImageManifest {
        &self.manifest
    }

    /// Layers of the selected manifest, bottom to top.
    pub fn layers(&self) -> &[Descriptor] {
        self.manifest.layers()
    }

    /// Image configuration.
    pub fn config(&self) -> &ImageConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pce_oci_core::media::MEDIA_TYPE_LAYER_LXC_GZIP;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    const CONFIG_HASH: &str = "configabc123";
    const MANIFEST_HASH: &str = "manifestxyz789";

    fn write_blob(root: &Path, hash: &str, value: &serde_json::Value) {
        let dir = root.join("blobs/sha256");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(hash), serde_json::to_vec(value).unwrap()).unwrap();
    }

    fn write_index(root: &Path, value: &serde_json::Value) {
        fs::write(root.join("index.json"), serde_json::to_vec(value).unwrap()).unwrap();
    }

    // Helper function to create a complete LXC image for testing
    fn create_complete_image(root: &Path) {
        fs::write(root.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();

        write_blob(
            root,
            CONFIG_HASH,
            &json!({
                "architecture": "amd64",
                "os": "linux",
                "rootfs": {"type": "layers", "diff_ids": []}
            }),
        );
        write_blob(
            root,
            MANIFEST_HASH,
            &json!({
                "schemaVersion": 2,
                "mediaType": MEDIA_TYPE_IMAGE_MANIFEST,
                "config": {
                    "mediaType": MEDIA_TYPE_IMAGE_CONFIG,
                    "digest": format!("sha256:{CONFIG_HASH}"),
                    "size": 10
                },
                "layers": [
                    {"mediaType": MEDIA_TYPE_LAYER_LXC_GZIP, "digest": "sha256:layer1", "size": 1},
                    {"mediaType": MEDIA_TYPE_LAYER_LXC_GZIP, "digest": "sha256:layer2", "size": 1}
                ]
            }),
        );
        write_index(
            root,
            &json!({
                "schemaVersion": 2,
                "mediaType": MEDIA_TYPE_IMAGE_INDEX,
                "manifests": [{
                    "mediaType": MEDIA_TYPE_IMAGE_MANIFEST,
                    "digest": format!("sha256:{MANIFEST_HASH}"),
                    "size": 100,
                    "platform": {"os": "linux", "architecture": "amd64"},
                    "annotations": {"org.pextra.image.type": "lxc"}
                }]
            }),
        );
    }

    fn linux_amd64() -> TargetPlatform {
        TargetPlatform::new("linux", "amd64")
    }

    #[test]
    fn test_load_valid_image() {
        let temp_dir = TempDir::new().unwrap();
        create_complete_image(temp_dir.path());

        let image = ResolvedImage::load(temp_dir.path(), &linux_amd64()).unwrap();

        assert_eq!(image.path(), temp_dir.path());
        assert_eq!(image.layout_version(), "1.0.0");
        assert_eq!(image.image_type(), ImageType::Lxc);
        assert_eq!(
            image.selected_descriptor().digest,
            format!("sha256:{MANIFEST_HASH}")
        );
        assert_eq!(image.index().manifests.len(), 1);
        let layers: Vec<String> = image.layers().iter().map(|l| l.digest().to_string()).collect();
        assert_eq!(layers, ["sha256:layer1", "sha256:layer2"]);
        assert_eq!(image.config().os, "linux");
        assert_eq!(image.config().architecture, "amd64");
    }

    #[test]
    fn test_load_config_without_history() {
        let temp_dir = TempDir::new().unwrap();
        create_complete_image(temp_dir.path());
        write_blob(
            temp_dir.path(),
            CONFIG_HASH,
            &json!({"architecture": "amd64", "os": "linux"}),
        );

        let image = ResolvedImage::load(temp_dir.path(), &linux_amd64()).unwrap();

        assert!(image.config().history.is_empty());
        assert!(image.config().rootfs.is_none());
        assert_eq!(image.layers().len(), 2);
    }

    #[test]
    fn test_load_invalid_config_blob() {
        let temp_dir = TempDir::new().unwrap();
        create_complete_image(temp_dir.path());
        fs::write(
            temp_dir.path().join("blobs/sha256").join(CONFIG_HASH),
            b"not json",
        )
        .unwrap();

        let err = ResolvedImage::load(temp_dir.path(), &linux_amd64()).unwrap_err();
        assert!(matches!(err, ImageError::SerializationError(_)));
    }

    #[test]
    fn test_load_nonexistent() {
        let err = ResolvedImage::load("/nonexistent/path", &linux_amd64()).unwrap_err();
        assert!(matches!(err, ImageError::LayoutError(_)));
    }

    #[test]
    fn test_load_unsupported_layout_version() {
        let temp_dir = TempDir::new().unwrap();
        create_complete_image(temp_dir.path());
        fs::write(
            temp_dir.path().join("oci-layout"),
            r#"{"imageLayoutVersion":"2.0.0"}"#,
        )
        .unwrap();

        let err = ResolvedImage::load(temp_dir.path(), &linux_amd64()).unwrap_err();
        assert!(err.to_string().contains("unsupported layout version"));
    }

    #[test]
    fn test_load_wrong_index_media_type() {
        let temp_dir = TempDir::new().unwrap();
        create_complete_image(temp_dir.path());
        write_index(
            temp_dir.path(),
            &json!({"schemaVersion": 2, "mediaType": "application/json", "manifests": []}),
        );

        let err = ResolvedImage::load(temp_dir.path(), &linux_amd64()).unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedMediaType { .. }));
    }

    #[test]
    fn test_load_empty_index() {
        let temp_dir = TempDir::new().unwrap();
        create_complete_image(temp_dir.path());
        write_index(
            temp_dir.path(),
            &json!({"schemaVersion": 2, "mediaType": MEDIA_TYPE_IMAGE_INDEX, "manifests": []}),
        );

        let err = ResolvedImage::load(temp_dir.path(), &linux_amd64()).unwrap_err();
        assert!(matches!(err, ImageError::ManifestSelectionError(_)));
        assert!(err.to_string().contains("no manifests"));
    }

    #[test]
    fn test_load_wrong_config_media_type() {
        let temp_dir = TempDir::new().unwrap();
        create_complete_image(temp_dir.path());
        write_blob(
            temp_dir.path(),
            MANIFEST_HASH,
            &json!({
                "schemaVersion": 2,
                "mediaType": MEDIA_TYPE_IMAGE_MANIFEST,
                "config": {
                    "mediaType": "application/vnd.docker.container.image.v1+json",
                    "digest": format!("sha256:{CONFIG_HASH}"),
                    "size": 10
                },
                "layers": []
            }),
        );

        let err = ResolvedImage::load(temp_dir.path(), &linux_amd64()).unwrap_err();
        match err {
            ImageError::UnsupportedMediaType { kind, .. } => assert_eq!(kind, "config"),
            other => panic!("Expected UnsupportedMediaType, got {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_manifest_blob() {
        let temp_dir = TempDir::new().unwrap();
        create_complete_image(temp_dir.path());
        fs::remove_file(temp_dir.path().join("blobs/sha256").join(MANIFEST_HASH)).unwrap();

        let err = ResolvedImage::load(temp_dir.path(), &linux_amd64()).unwrap_err();
        assert!(matches!(err, ImageError::Filesystem { .. }));
    }
}
