//! Layer chain flattening.
//!
//! [`extract_image`] resolves an image and hands its layers to the engine
//! matching the image type:
//!
//! ```text
//! ResolvedImage ──lxc──▶ LxcFlattener  ─▶ tar per layer ─▶ rootfs directory
//!               └─qemu─▶ QemuFlattener ─▶ qemu-img      ─▶ standalone qcow2 files
//! ```

mod lxc;
mod qemu;
mod whiteout;

pub use lxc::LxcFlattener;
pub use qemu::{FlattenSummary, QemuFlattener};
pub use whiteout::{LayerPlan, WhiteoutPlanner};

use pce_oci_core::error::Result;
use pce_oci_core::{ExtractConfig, ImageType};
use std::path::Path;

use crate::oci::ResolvedImage;
use crate::tools::{SystemTools, ToolRunner};

/// Result of extracting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// LXC layers applied onto the output directory
    Lxc { layers: usize },

    /// qcow2 layers converted into the output directory
    Qemu(FlattenSummary),
}

/// Extract the image at `image_path` into `output_dir` using the host tools
/// named in `config`.
pub fn extract_image(
    image_path: &Path,
    output_dir: &Path,
    config: &ExtractConfig,
) -> Result<ExtractOutcome> {
    let tools = SystemTools::new(&config.tools);
    extract_image_with(&tools, image_path, output_dir, config)
}

/// Same as [`extract_image`] with an explicit tool runner.
pub fn extract_image_with(
    tools: &dyn ToolRunner,
    image_path: &Path,
    output_dir: &Path,
    config: &ExtractConfig,
) -> Result<ExtractOutcome> {
    let image = ResolvedImage::load(image_path, &config.platform)?;

    match image.image_type() {
        ImageType::Lxc => {
            let layers = LxcFlattener::new(image.layers(), image.path(), output_dir, tools).flatten()?;
            Ok(ExtractOutcome::Lxc { layers })
        }
        ImageType::Qemu => {
            let summary =
                QemuFlattener::new(image.layers(), image.path(), output_dir, tools).flatten()?;
            Ok(ExtractOutcome::Qemu(summary))
        }
    }
}
