//! External tool invocation.
//!
//! Archive listing, archive extraction and disk conversion are delegated to
//! `tar` and `qemu-img`. Engines only see the [`ToolRunner`] trait so they can
//! be driven by a fake in tests.

use pce_oci_core::error::{ImageError, Result};
use pce_oci_core::ToolConfig;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::oci::LayerCompression;

#[cfg(test)]
pub(crate) mod fake;

/// Lazy, finite, non-restartable sequence of archive entry paths.
pub type EntryStream = Box<dyn Iterator<Item = Result<String>>>;

/// Everything an archive extraction needs.
#[derive(Debug, Clone)]
pub struct ExtractRequest<'a> {
    /// Archive to extract
    pub archive: &'a Path,

    /// Directory the archive is extracted onto
    pub target: &'a Path,

    /// Decompression applied to the archive
    pub compression: LayerCompression,

    /// Wildcard patterns passed one per `--exclude`; see [`literal_exclude`]
    pub excludes: &'a [String],

    /// Apply ownership recorded in the archive (requires root)
    pub preserve_ownership: bool,
}

/// Process execution capability used by the flatten engines.
pub trait ToolRunner {
    /// List entry paths of `archive`, one per item, as the tool prints them.
    fn list_entries(&self, archive: &Path, compression: LayerCompression) -> Result<EntryStream>;

    /// Extract an archive onto a directory.
    fn extract(&self, request: &ExtractRequest<'_>) -> Result<()>;

    /// Convert a (possibly backed) disk image into a standalone qcow2 image.
    fn convert_disk(&self, source: &Path, destination: &Path) -> Result<()>;
}

/// [`ToolRunner`] backed by host binaries.
#[derive(Debug, Clone)]
pub struct SystemTools {
    tar: PathBuf,
    qemu_img: PathBuf,
}

impl SystemTools {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            tar: config.tar.clone(),
            qemu_img: config.qemu_img.clone(),
        }
    }
}

impl Default for SystemTools {
    fn default() -> Self {
        Self::new(&ToolConfig::default())
    }
}

impl ToolRunner for SystemTools {
    fn list_entries(&self, archive: &Path, compression: LayerCompression) -> Result<EntryStream> {
        let tool = self.tar.display().to_string();
        let mut child = Command::new(&self.tar)
            .args(list_args(archive, compression))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ImageError::tool(&tool, format!("failed to start: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ImageError::tool(&tool, "stdout was not captured"))?;

        tracing::debug!(tool = %tool, archive = %archive.display(), "Listing archive entries");

        Ok(Box::new(ChildLines {
            tool,
            child: Some(child),
            lines: BufReader::new(stdout).lines(),
        }))
    }

    fn extract(&self, request: &ExtractRequest<'_>) -> Result<()> {
        tracing::debug!(
            archive = %request.archive.display(),
            target = %request.target.display(),
            excludes = request.excludes.len(),
            "Extracting archive"
        );
        run_to_completion(&self.tar, extract_args(request))
    }

    fn convert_disk(&self, source: &Path, destination: &Path) -> Result<()> {
        tracing::debug!(
            source = %source.display(),
            destination = %destination.display(),
            "Converting disk image"
        );
        run_to_completion(&self.qemu_img, convert_args(source, destination))
    }
}

/// `tar` arguments that list an archive.
pub fn list_args(archive: &Path, compression: LayerCompression) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-t".into()];
    if let Some(flag) = compression.tar_flag() {
        args.push(flag.into());
    }
    args.push("-f".into());
    args.push(archive.into());
    args
}

/// `tar` arguments that extract an archive onto a directory.
pub fn extract_args(request: &ExtractRequest<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-C".into(), request.target.into(), "-x".into()];
    if let Some(flag) = request.compression.tar_flag() {
        args.push(flag.into());
    }

    for flag in [
        "--numeric-owner",
        "--same-permissions",
        "--delay-directory-restore",
        "--keep-directory-symlink",
        "--overwrite",
        "--xattrs",
        "--xattrs-include=*",
        "--acls",
        "--selinux",
    ] {
        args.push(flag.into());
    }

    if !request.preserve_ownership {
        args.push("--no-same-owner".into());
    }

    for exclude in request.excludes {
        args.push(format!("--exclude={exclude}").into());
    }

    args.push("-f".into());
    args.push(request.archive.into());
    args
}

/// Escape `tar` wildcard characters so that `path` only excludes itself.
pub fn literal_exclude(path: &str) -> String {
    let mut pattern = String::with_capacity(path.len());
    for c in path.chars() {
        if matches!(c, '*' | '?' | '[' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern
}

/// `qemu-img` arguments that write a standalone qcow2 image.
pub fn convert_args(source: &Path, destination: &Path) -> Vec<OsString> {
    vec![
        "convert".into(),
        "-O".into(),
        "qcow2".into(),
        source.into(),
        destination.into(),
    ]
}

/// Run `program` and fail with its stderr when it exits non-zero.
fn run_to_completion(program: &Path, args: Vec<OsString>) -> Result<()> {
    let tool = program.display().to_string();
    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ImageError::tool(&tool, format!("failed to start: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ImageError::tool(
            tool,
            format!("{} ({})", output.status, stderr.trim()),
        ));
    }

    Ok(())
}

/// Lines of a child's stdout; reaps the child once the stream ends.
struct ChildLines {
    tool: String,
    child: Option<Child>,
    lines: Lines<BufReader<ChildStdout>>,
}

impl ChildLines {
    fn finish(&mut self) -> Option<Result<String>> {
        let mut child = self.child.take()?;
        match child.wait() {
            Ok(status) if status.success() => None,
            Ok(status) => Some(Err(ImageError::tool(&self.tool, status.to_string()))),
            Err(e) => Some(Err(ImageError::tool(&self.tool, format!("wait failed: {e}")))),
        }
    }
}

impl Iterator for ChildLines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.child.as_ref()?;
        match self.lines.next() {
            Some(Ok(line)) => Some(Ok(line)),
            Some(Err(e)) => {
                if let Some(mut child) = self.child.take() {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                Some(Err(ImageError::tool(
                    &self.tool,
                    format!("reading output: {e}"),
                )))
            }
            None => self.finish(),
        }
    }
}

impl Drop for ChildLines {
    fn drop(&mut self) {
        // Consumer stopped early: do not leave a zombie behind.
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
