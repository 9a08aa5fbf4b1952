//! pce-oci Runtime - manifest resolution and layer flattening.
//!
//! This crate resolves a platform-appropriate manifest from a Pextra OCI
//! image layout and collapses its layer chain into either a flattened rootfs
//! directory (LXC images) or standalone qcow2 disks (QEMU images).

pub mod flatten;
pub mod host;
pub mod oci;
pub mod tools;

// Re-export common types
pub use flatten::{
    extract_image, extract_image_with, ExtractOutcome, FlattenSummary, LayerPlan, LxcFlattener,
    QemuFlattener, WhiteoutPlanner,
};
pub use host::is_privileged;
pub use oci::{
    select_layers, ImageConfig, ImageIndex, ImageLayout, LayerCompression, ManifestDescriptor,
    ManifestResolver, Platform, ResolvedImage, SelectedManifest,
};
pub use tools::{literal_exclude, EntryStream, ExtractRequest, SystemTools, ToolRunner};

/// pce-oci Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
