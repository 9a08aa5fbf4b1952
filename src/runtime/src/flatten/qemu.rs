//! QEMU qcow2 chain flattening.
//!
//! Each disk layer is a qcow2 delta whose backing file is named after the
//! layer below it. A scratch directory of symlinks (file name -> blob) lets
//! `qemu-img` resolve that chain without copying blobs; layers flagged for
//! flattening are then converted into standalone images in the output
//! directory.

use oci_spec::image::Descriptor;
use pce_oci_core::error::{ImageError, Result};
use pce_oci_core::media::{
    ANNOTATION_QEMU_FILE_NAME, ANNOTATION_QEMU_FLATTEN, MEDIA_TYPE_LAYER_QCOW2,
};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::oci::{annotation, blob_path, select_layers};
use crate::tools::ToolRunner;

const WORKDIR_PREFIX: &str = "pce-oci-qemu-flatten-";

/// Outcome of a QEMU flatten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlattenSummary {
    /// Layers converted into standalone images
    pub flattened: usize,

    /// Disk layers in the chain
    pub total: usize,
}

/// Flattens a qcow2 backing chain into standalone disk images.
pub struct QemuFlattener<'a> {
    layers: Vec<Descriptor>,
    image_path: PathBuf,
    output_dir: PathBuf,
    tools: &'a dyn ToolRunner,
}

impl<'a> QemuFlattener<'a> {
    /// Create a flattener over the qcow2 layers of `layers`.
    pub fn new(
        layers: &[Descriptor],
        image_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        tools: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            layers: select_layers(layers, &[MEDIA_TYPE_LAYER_QCOW2]),
            image_path: image_path.into(),
            output_dir: output_dir.into(),
            tools,
        }
    }

    /// Convert every layer annotated `org.pextra.qcow2.flatten=true`, newest
    /// first, into `<output_dir>/<file name>`.
    ///
    /// Unflagged layers are not copied. Independent disks and companion
    /// media (CD-ROM images) are not handled.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - There are no qcow2 layers
    /// - A layer has a missing, unsafe or duplicate file name
    /// - The scratch directory cannot be prepared
    /// - `qemu-img` fails or writes no output
    pub fn flatten(&self) -> Result<FlattenSummary> {
        if self.layers.is_empty() {
            return Err(ImageError::NoLayers {
                kind: "QEMU".to_string(),
            });
        }

        let file_names = self.file_names()?;

        // Symlink targets must not depend on the working directory.
        let image_root =
            fs::canonicalize(&self.image_path).map_err(|e| ImageError::fs(&self.image_path, e))?;
        fs::create_dir_all(&self.output_dir).map_err(|e| ImageError::fs(&self.output_dir, e))?;

        // Removed on drop, whatever the outcome.
        let workdir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir()
            .map_err(|e| ImageError::fs(std::env::temp_dir(), e))?;
        let workdir_path = workdir.path().to_path_buf();
        tracing::debug!(workdir = %workdir_path.display(), "Created qcow2 chain directory");

        for (layer, name) in self.layers.iter().zip(&file_names) {
            let digest = layer.digest().to_string();
            let target = blob_path(&image_root, &digest);
            let link = workdir_path.join(name);
            std::os::unix::fs::symlink(&target, &link)
                .map_err(|e| ImageError::fs(&link, e).in_layer(&digest, "link backing file"))?;
        }

        let total = self.layers.len();
        let mut flattened = 0;

        for (layer, name) in self.layers.iter().zip(&file_names).rev() {
            if annotation(layer, ANNOTATION_QEMU_FLATTEN) != Some("true") {
                continue;
            }

            let digest = layer.digest().to_string();
            let source = workdir_path.join(name);
            let destination = self.output_dir.join(name);
            tracing::debug!(
                digest = %digest,
                file = %name,
                destination = %destination.display(),
                "Flattening qcow2 layer"
            );

            self.tools
                .convert_disk(&source, &destination)
                .and_then(|()| check_output(&destination))
                .map_err(|e| e.in_layer(&digest, "convert"))?;
            flattened += 1;
        }

        workdir
            .close()
            .map_err(|e| ImageError::fs(&workdir_path, e))?;

        tracing::info!(
            "Flattened {}/{} QEMU layers into directory {}",
            flattened,
            total,
            self.output_dir.display()
        );
        Ok(FlattenSummary { flattened, total })
    }

    /// Logical file name of every layer, validated up front.
    fn file_names(&self) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(self.layers.len());

        for layer in &self.layers {
            let digest = layer.digest();
            let name = annotation(layer, ANNOTATION_QEMU_FILE_NAME).ok_or_else(|| {
                ImageError::LayoutError(format!(
                    "layer {digest} has no {ANNOTATION_QEMU_FILE_NAME} annotation"
                ))
            })?;

            if !is_plain_file_name(name) {
                return Err(ImageError::LayoutError(format!(
                    "layer {digest} has unsafe file name {name:?}"
                )));
            }
            if !seen.insert(name) {
                return Err(ImageError::LayoutError(format!(
                    "layer {digest} reuses file name {name:?}"
                )));
            }
            names.push(name.to_string());
        }

        Ok(names)
    }
}

/// A single normal path component: no separators, no `.` or `..`.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}

fn check_output(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(ImageError::tool(
            "qemu-img",
            format!("{} is empty", path.display()),
        )),
        Err(e) => Err(ImageError::tool(
            "qemu-img",
            format!("no output at {}: {e}", path.display()),
        )),
    }
}
