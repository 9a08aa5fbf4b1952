//! On-disk image layout access: layout files and the content-addressed blob store.

use pce_oci_core::error::{ImageError, Result};
use pce_oci_core::media::{IMAGE_BLOBS_DIR, IMAGE_INDEX_FILE, IMAGE_LAYOUT_FILE};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::index::ImageIndex;

/// Contents of the `oci-layout` file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutMarker {
    image_layout_version: String,
}

/// A read-only view of an OCI image layout directory.
#[derive(Debug, Clone)]
pub struct ImageLayout {
    root: PathBuf,
}

impl ImageLayout {
    /// Wrap `root` without checking it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open a layout directory, checking that it contains the layout marker and index.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(ImageError::LayoutError(format!(
                "not a directory: {}",
                root.display()
            )));
        }

        for file in [IMAGE_LAYOUT_FILE, IMAGE_INDEX_FILE] {
            let path = root.join(file);
            if !path.exists() {
                return Err(ImageError::LayoutError(format!(
                    "missing {} file at {}",
                    file,
                    path.display()
                )));
            }
        }

        Ok(Self::new(root))
    }

    /// Root directory of the layout.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the blob identified by `digest`.
    pub fn blob_path(&self, digest: &str) -> PathBuf {
        blob_path(&self.root, digest)
    }

    /// Read the `imageLayoutVersion` declared by the `oci-layout` file.
    pub fn read_layout_version(&self) -> Result<String> {
        let path = self.root.join(IMAGE_LAYOUT_FILE);
        let layout: LayoutMarker = read_json_file(&path).map_err(|e| {
            ImageError::LayoutError(format!("parse {}: {}", IMAGE_LAYOUT_FILE, e))
        })?;
        Ok(layout.image_layout_version)
    }

    /// Read and parse `index.json`.
    pub fn read_index(&self) -> Result<ImageIndex> {
        let path = self.root.join(IMAGE_INDEX_FILE);
        read_json_file(&path)
            .map_err(|e| ImageError::LayoutError(format!("parse {}: {}", IMAGE_INDEX_FILE, e)))
    }

    /// Read and parse the JSON blob identified by `digest`.
    pub fn read_blob_json<T: DeserializeOwned>(&self, digest: &str) -> Result<T> {
        read_json_file(&self.blob_path(digest))
    }
}

/// Split `algorithm:hex`. A digest without a separator yields an empty algorithm.
pub fn split_digest(digest: &str) -> (&str, &str) {
    match digest.split_once(':') {
        Some((algorithm, hex)) => (algorithm, hex),
        None => ("", digest),
    }
}

/// `<root>/blobs/<algorithm>/<hex>`.
pub fn blob_path(root: &Path, digest: &str) -> PathBuf {
    let (algorithm, hex) = split_digest(digest);
    let blobs = root.join(IMAGE_BLOBS_DIR);
    if algorithm.is_empty() {
        blobs.join(hex)
    } else {
        blobs.join(algorithm).join(hex)
    }
}

pub(crate) fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read(path).map_err(|e| ImageError::fs(path, e))?;
    serde_json::from_slice(&content).map_err(|e| {
        ImageError::SerializationError(format!("{}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_blob_path() {
        let root = PathBuf::from("/images/test");

        let path = blob_path(&root, "sha256:abc123");
        assert_eq!(path, PathBuf::from("/images/test/blobs/sha256/abc123"));

        let path = blob_path(&root, "sha512:def");
        assert_eq!(path, PathBuf::from("/images/test/blobs/sha512/def"));
    }

    #[test]
    fn test_blob_path_without_algorithm() {
        let root = PathBuf::from("/images/test");
        assert_eq!(
            blob_path(&root, "abc123"),
            PathBuf::from("/images/test/blobs/abc123")
        );
    }

    #[test]
    fn test_split_digest() {
        assert_eq!(split_digest("sha256:abc"), ("sha256", "abc"));
        assert_eq!(split_digest("abc"), ("", "abc"));
        assert_eq!(split_digest("a:b:c"), ("a", "b:c"));
    }

    #[test]
    fn test_open_not_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file");
        fs::write(&file, "x").unwrap();

        let err = ImageLayout::open(&file).unwrap_err();
        assert!(matches!(err, ImageError::LayoutError(_)));
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_open_missing_oci_layout() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("index.json"), "{}").unwrap();

        let err = ImageLayout::open(temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("oci-layout"));
    }

    #[test]
    fn test_open_missing_index() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("oci-layout"),
            r#"{"imageLayoutVersion":"1.0.0"}"#,
        )
        .unwrap();

        let err = ImageLayout::open(temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("index.json"));
    }

    #[test]
    fn test_read_layout_version() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("oci-layout"),
            r#"{"imageLayoutVersion":"1.0.0"}"#,
        )
        .unwrap();
        fs::write(temp_dir.path().join("index.json"), "{}").unwrap();

        let layout = ImageLayout::open(temp_dir.path()).unwrap();
        assert_eq!(layout.read_layout_version().unwrap(), "1.0.0");
    }

    #[test]
    fn test_read_layout_version_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("oci-layout"), "not json").unwrap();

        let layout = ImageLayout::new(temp_dir.path());
        let err = layout.read_layout_version().unwrap_err();
        assert!(matches!(err, ImageError::LayoutError(_)));
    }

    #[test]
    fn test_read_blob_json_success_and_missing() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ImageLayout::new(temp_dir.path());
        let path = layout.blob_path("sha256:abc123");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"n":"v"}"#).unwrap();

        let value: serde_json::Value = layout.read_blob_json("sha256:abc123").unwrap();
        assert_eq!(value["n"], "v");

        let err = layout
            .read_blob_json::<serde_json::Value>("sha256:doesnotexist")
            .unwrap_err();
        assert!(matches!(err, ImageError::Filesystem { .. }));
    }

    #[test]
    fn test_read_blob_json_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ImageLayout::new(temp_dir.path());
        let path = layout.blob_path("sha256:bad");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{oops").unwrap();

        let err = layout
            .read_blob_json::<serde_json::Value>("sha256:bad")
            .unwrap_err();
        assert!(matches!(err, ImageError::SerializationError(_)));
    }
}
