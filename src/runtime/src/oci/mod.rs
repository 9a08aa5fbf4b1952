//! OCI image layout support for pce-oci.
//!
//! This module reads a Pextra-flavoured OCI image layout, picks the manifest
//! that suits the target platform and exposes its ordered layer chain.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    OCI Image Layout                          │
//! │                                                              │
//! │  image/                                                      │
//! │  ├── oci-layout           (layout version marker)           │
//! │  ├── index.json           (image index, may nest indices)   │
//! │  └── blobs/                                                 │
//! │      └── sha256/                                            │
//! │          ├── <manifest>   (org.pextra.image.type = lxc|qemu)│
//! │          ├── <config>     (image configuration)             │
//! │          └── <layers>     (lxc tarballs or qcow2 chain)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod image;
mod index;
mod layers;
mod layout;
mod resolve;

pub use config::{History, ImageConfig, RootFs};
pub use image::ResolvedImage;
pub use index::{ImageIndex, ManifestDescriptor, Platform};
pub use layers::{annotation, select_layers, LayerCompression};
pub use layout::{blob_path, split_digest, ImageLayout};
pub use resolve::{matches_platform, ManifestResolver, SelectedManifest, MAX_NESTED_DEPTH};
