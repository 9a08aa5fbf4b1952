//! pce-oci Core - Foundational Types
//!
//! This crate provides the error taxonomy, configuration values and the
//! media-type / annotation vocabulary shared by the runtime and the CLI.

pub mod config;
pub mod error;
pub mod media;

// Re-export commonly used types
pub use config::{ExtractConfig, OutputFormat, TargetPlatform, ToolConfig};
pub use error::{ImageError, Result};
pub use media::ImageType;

/// pce-oci version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
