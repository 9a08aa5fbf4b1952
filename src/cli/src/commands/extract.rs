//! `pce-oci extract` command - flatten an image's layers into a directory.
//!
//! LXC images become a root filesystem tree; QEMU images become standalone
//! qcow2 files for every layer flagged for flattening.

use clap::Args;
use pce_oci_core::{ExtractConfig, OutputFormat, TargetPlatform, ToolConfig};
use pce_oci_runtime::{extract_image, ExtractOutcome};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Path to the OCI image layout directory
    pub image_path: PathBuf,

    /// Directory to extract into (created if missing)
    pub output_dir: PathBuf,

    /// Operating system to select from a multi-platform index [default: host]
    #[arg(long)]
    pub os: Option<String>,

    /// Architecture to select from a multi-platform index [default: host]
    #[arg(long)]
    pub arch: Option<String>,

    /// tar binary used to list and extract LXC layers
    #[arg(long, default_value = "tar")]
    pub tar: PathBuf,

    /// qemu-img binary used to flatten QEMU layers
    #[arg(long, default_value = "qemu-img")]
    pub qemu_img: PathBuf,
}

impl ExtractArgs {
    /// Build the extraction config, filling the platform from the host.
    pub fn config(&self, output: OutputFormat) -> ExtractConfig {
        let host = TargetPlatform::host();
        ExtractConfig {
            platform: TargetPlatform::new(
                self.os.clone().unwrap_or(host.os),
                self.arch.clone().unwrap_or(host.architecture),
            ),
            output,
            tools: ToolConfig {
                tar: self.tar.clone(),
                qemu_img: self.qemu_img.clone(),
            },
        }
    }
}

pub async fn execute(
    args: ExtractArgs,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.config(output);
    tracing::debug!(
        image = %args.image_path.display(),
        platform = %config.platform,
        "Extracting image"
    );

    // Flattening shells out and walks the filesystem synchronously.
    let image_path = args.image_path.clone();
    let output_dir = args.output_dir.clone();
    let outcome =
        tokio::task::spawn_blocking(move || extract_image(&image_path, &output_dir, &config))
            .await??;

    match outcome {
        ExtractOutcome::Lxc { layers } => tracing::debug!(layers, "LXC image extracted"),
        ExtractOutcome::Qemu(summary) => tracing::debug!(
            flattened = summary.flattened,
            total = summary.total,
            "QEMU image extracted"
        ),
    }

    println!(
        "Layers extracted successfully to {}",
        args.output_dir.display()
    );
    Ok(())
}
