//! Whiteout and opaque-directory handling for LXC layers.
//!
//! A layer tarball marks deletions with special entries:
//!
//! ```text
//! dir/.wh.name       remove dir/name from the layers below
//! dir/.wh..wh..opq   discard everything below dir before this layer lands
//! ```
//!
//! The planner lists a layer once to collect those markers; the resulting
//! [`LayerPlan`] is applied to the accumulated tree before the layer itself is
//! extracted.

use pce_oci_core::error::{ImageError, Result};
use pce_oci_core::media::{OPAQUE_DIR_MARKER, WHITEOUT_PREFIX};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::oci::LayerCompression;
use crate::tools::ToolRunner;

/// Deletions one layer applies to the layers below it.
///
/// Paths are relative to the root filesystem, `/`-separated and normalized.
/// The root directory itself is the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerPlan {
    /// Directories whose existing children are discarded
    pub opaque_dirs: BTreeSet<String>,

    /// Paths removed, in listing order
    pub whiteouts: Vec<String>,
}

/// Lists layer archives and classifies their marker entries.
pub struct WhiteoutPlanner<'a> {
    tools: &'a dyn ToolRunner,
}

impl<'a> WhiteoutPlanner<'a> {
    pub fn new(tools: &'a dyn ToolRunner) -> Self {
        Self { tools }
    }

    /// Collect the opaque directories and whiteout targets of one layer.
    ///
    /// The listing is consumed line by line as the archive tool produces it.
    pub fn plan(&self, archive: &Path, compression: LayerCompression) -> Result<LayerPlan> {
        let mut plan = LayerPlan::default();

        for line in self.tools.list_entries(archive, compression)? {
            let line = line?;
            match classify_entry(&line) {
                EntryKind::Opaque(dir) => {
                    plan.opaque_dirs.insert(dir);
                }
                EntryKind::Whiteout(target) => plan.whiteouts.push(target),
                EntryKind::Rejected(reason) => {
                    tracing::warn!(entry = %line.trim(), reason, "Ignoring whiteout marker");
                }
                EntryKind::Plain => {}
            }
        }

        tracing::debug!(
            archive = %archive.display(),
            opaque_dirs = plan.opaque_dirs.len(),
            whiteouts = plan.whiteouts.len(),
            "Planned layer whiteouts"
        );
        Ok(plan)
    }

    /// Entries that would land outside the extraction root, as listed.
    pub fn plan_unsafe_entries(
        &self,
        archive: &Path,
        compression: LayerCompression,
    ) -> Result<Vec<String>> {
        let mut unsafe_entries = Vec::new();

        for line in self.tools.list_entries(archive, compression)? {
            let line = line?;
            let entry = line.trim();
            if !entry.is_empty() && is_unsafe_entry(entry) {
                unsafe_entries.push(entry.to_string());
            }
        }

        if !unsafe_entries.is_empty() {
            tracing::warn!(
                archive = %archive.display(),
                count = unsafe_entries.len(),
                "Excluding unsafe archive entries"
            );
        }
        Ok(unsafe_entries)
    }
}

impl LayerPlan {
    /// Empty every recorded opaque directory that exists under `root`.
    ///
    /// The directories themselves are kept.
    pub fn clear_opaque_dirs(&self, root: &Path) -> Result<()> {
        for dir in &self.opaque_dirs {
            let Some(path) = guarded_path(root, dir)? else {
                continue;
            };
            match fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ImageError::fs(&path, e)),
            }

            let entries = fs::read_dir(&path).map_err(|e| ImageError::fs(&path, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| ImageError::fs(&path, e))?;
                remove_all(&entry.path())?;
            }
            tracing::debug!(dir = %path.display(), "Cleared opaque directory");
        }
        Ok(())
    }

    /// Remove every whiteout target present under `root`.
    pub fn remove_whiteouts(&self, root: &Path) -> Result<()> {
        for target in &self.whiteouts {
            if let Some(path) = guarded_path(root, target)? {
                remove_all(&path)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum EntryKind {
    Opaque(String),
    Whiteout(String),
    Rejected(&'static str),
    Plain,
}

fn classify_entry(line: &str) -> EntryKind {
    let entry = line.trim();
    if entry.is_empty() {
        return EntryKind::Plain;
    }
    let entry = entry.strip_prefix("./").unwrap_or(entry);
    let cleaned = clean_path(entry);
    let (dir, base) = split_path(&cleaned);

    if base == OPAQUE_DIR_MARKER {
        let dir = if dir == "." { String::new() } else { dir.to_string() };
        if escapes_root(&dir) {
            return EntryKind::Rejected("opaque directory outside the root");
        }
        return EntryKind::Opaque(dir);
    }

    if let Some(name) = base.strip_prefix(WHITEOUT_PREFIX) {
        if matches!(name, "" | "." | "..") {
            return EntryKind::Rejected("empty whiteout name");
        }
        let target = if dir == "." {
            name.to_string()
        } else {
            clean_path(&format!("{dir}/{name}"))
        };
        if escapes_root(&target) {
            return EntryKind::Rejected("whiteout target outside the root");
        }
        return EntryKind::Whiteout(target);
    }

    EntryKind::Plain
}

/// Absolute paths and paths with a `..` segment are never extracted.
fn is_unsafe_entry(entry: &str) -> bool {
    let entry = entry.strip_prefix("./").unwrap_or(entry);
    entry.starts_with('/') || entry.split('/').any(|segment| segment == "..")
}

fn escapes_root(cleaned: &str) -> bool {
    cleaned.starts_with('/') || cleaned == ".." || cleaned.starts_with("../")
}

/// Lexical path normalization: collapses separators, `.` and `..`.
fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            s => parts.push(s),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Split a cleaned path into its parent and final component.
fn split_path(cleaned: &str) -> (&str, &str) {
    match cleaned.rfind('/') {
        Some(0) => ("/", &cleaned[1..]),
        Some(i) => (&cleaned[..i], &cleaned[i + 1..]),
        None => (".", cleaned),
    }
}

/// Join `rel` onto `root`, refusing to traverse symlinks or non-directories
/// on the way to the final component.
///
/// `None` means nothing at `rel` can be reached inside `root`.
fn guarded_path(root: &Path, rel: &str) -> Result<Option<PathBuf>> {
    let components: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
    let mut path = root.to_path_buf();

    for (i, component) in components.iter().enumerate() {
        path.push(component);
        if i + 1 == components.len() {
            break;
        }
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                tracing::warn!(path = %path.display(), "Not following symlink while applying whiteouts");
                return Ok(None);
            }
            Ok(meta) if !meta.is_dir() => return Ok(None),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ImageError::fs(&path, e)),
        }
    }

    Ok(Some(path))
}

/// Remove a file, symlink or directory tree. A missing path is not an error.
fn remove_all(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ImageError::fs(path, e)),
    };

    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ImageError::fs(path, e)),
    }
}
