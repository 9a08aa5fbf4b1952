//! LXC layer chain flattening.
//!
//! Layers are applied oldest first onto a single directory. Each layer's
//! whiteouts and opaque directories are applied before its own entries are
//! extracted.

use oci_spec::image::Descriptor;
use pce_oci_core::error::{ImageError, Result};
use pce_oci_core::media::{LXC_LAYER_MEDIA_TYPES, OPAQUE_DIR_MARKER, WHITEOUT_PREFIX};
use std::fs;
use std::path::PathBuf;

use super::whiteout::WhiteoutPlanner;
use crate::host::is_privileged;
use crate::oci::{blob_path, select_layers, LayerCompression};
use crate::tools::{literal_exclude, ExtractRequest, ToolRunner};

/// Patterns for marker entries, at the archive root and nested. Markers are
/// consumed by the planner and never extracted.
fn marker_excludes() -> Vec<String> {
    let whiteout = format!("{WHITEOUT_PREFIX}*");
    vec![
        whiteout.clone(),
        format!("*/{whiteout}"),
        OPAQUE_DIR_MARKER.to_string(),
        format!("*/{OPAQUE_DIR_MARKER}"),
    ]
}

/// Flattens LXC tarball layers into one root filesystem directory.
pub struct LxcFlattener<'a> {
    layers: Vec<Descriptor>,
    image_path: PathBuf,
    output_dir: PathBuf,
    tools: &'a dyn ToolRunner,
    preserve_ownership: bool,
}

impl<'a> LxcFlattener<'a> {
    /// Create a flattener over the LXC layers of `layers`.
    ///
    /// Layers of other media types are dropped. Archive ownership is applied
    /// only when running as root.
    pub fn new(
        layers: &[Descriptor],
        image_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        tools: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            layers: select_layers(layers, &LXC_LAYER_MEDIA_TYPES),
            image_path: image_path.into(),
            output_dir: output_dir.into(),
            tools,
            preserve_ownership: is_privileged(),
        }
    }

    pub fn with_preserve_ownership(mut self, preserve: bool) -> Self {
        self.preserve_ownership = preserve;
        self
    }

    /// Apply every layer in chain order and return how many were applied.
    ///
    /// A failure leaves the output directory partially populated.
    pub fn flatten(&self) -> Result<usize> {
        if self.layers.is_empty() {
            return Err(ImageError::NoLayers {
                kind: "LXC".to_string(),
            });
        }

        fs::create_dir_all(&self.output_dir).map_err(|e| ImageError::fs(&self.output_dir, e))?;

        let planner = WhiteoutPlanner::new(self.tools);
        let total = self.layers.len();

        for (i, layer) in self.layers.iter().enumerate() {
            let digest = layer.digest().to_string();
            tracing::debug!(layer = i + 1, total, digest = %digest, "Applying LXC layer");

            self.apply_layer(&planner, layer)
                .map_err(|(stage, e)| e.in_layer(&digest, stage))?;
        }

        tracing::info!(
            "Extracted {} LXC layers into directory {}",
            total,
            self.output_dir.display()
        );
        Ok(total)
    }

    fn apply_layer(
        &self,
        planner: &WhiteoutPlanner<'_>,
        layer: &Descriptor,
    ) -> std::result::Result<(), (&'static str, ImageError)> {
        let compression = LayerCompression::from_media_type(&layer.media_type().to_string())
            .map_err(|e| ("media type", e))?;
        let blob = blob_path(&self.image_path, &layer.digest().to_string());

        let plan = planner
            .plan(&blob, compression)
            .map_err(|e| ("plan whiteouts", e))?;
        plan.clear_opaque_dirs(&self.output_dir)
            .map_err(|e| ("clear opaque directories", e))?;
        plan.remove_whiteouts(&self.output_dir)
            .map_err(|e| ("remove whiteouts", e))?;

        let unsafe_entries = planner
            .plan_unsafe_entries(&blob, compression)
            .map_err(|e| ("scan unsafe entries", e))?;

        let mut excludes = marker_excludes();
        excludes.extend(unsafe_entries.iter().map(|entry| literal_exclude(entry)));

        self.tools
            .extract(&ExtractRequest {
                archive: &blob,
                target: &self.output_dir,
                compression,
                excludes: &excludes,
                preserve_ownership: self.preserve_ownership,
            })
            .map_err(|e| ("extract", e))
    }
}
