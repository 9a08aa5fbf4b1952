use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration threaded from the command line into resolution and flattening.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Platform used to pick a manifest from a multi-arch index
    pub platform: TargetPlatform,

    /// Output format requested by the caller
    pub output: OutputFormat,

    /// External tool locations
    pub tools: ToolConfig,
}

/// Target platform in OCI vocabulary (`linux`/`amd64`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPlatform {
    pub os: String,
    pub architecture: String,
}

impl TargetPlatform {
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
        }
    }

    /// The platform of the running host.
    pub fn host() -> Self {
        Self::new(
            oci_os(std::env::consts::OS),
            oci_arch(std::env::consts::ARCH),
        )
    }
}

impl Default for TargetPlatform {
    fn default() -> Self {
        Self::host()
    }
}

impl std::fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)
    }
}

/// Map a Rust `target_os` name to its OCI `os` value.
pub fn oci_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

/// Map a Rust `target_arch` name to its OCI `architecture` value.
pub fn oci_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64le",
        "loongarch64" => "loong64",
        other => other,
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Locations of the external tools the engines shell out to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Archive tool (GNU tar compatible)
    pub tar: PathBuf,

    /// Disk-image converter
    pub qemu_img: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            tar: PathBuf::from("tar"),
            qemu_img: PathBuf::from("qemu-img"),
        }
    }
}
