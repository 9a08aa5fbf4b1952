//! In-memory [`ToolRunner`] for engine tests.

use glob::Pattern;
use pce_oci_core::error::{ImageError, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{EntryStream, ExtractRequest, ToolRunner};
use crate::oci::LayerCompression;

/// One archive member: a directory when `contents` is `None`.
#[derive(Debug, Clone)]
pub(crate) struct FakeEntry {
    pub path: String,
    pub contents: Option<Vec<u8>>,
}

pub(crate) fn file(path: &str, contents: &str) -> FakeEntry {
    FakeEntry {
        path: path.to_string(),
        contents: Some(contents.as_bytes().to_vec()),
    }
}

pub(crate) fn dir(path: &str) -> FakeEntry {
    FakeEntry {
        path: path.to_string(),
        contents: None,
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedExtract {
    pub archive: PathBuf,
    pub target: PathBuf,
    pub compression: LayerCompression,
    pub excludes: Vec<String>,
    pub preserve_ownership: bool,
}

#[derive(Default)]
pub(crate) struct FakeTools {
    archives: HashMap<PathBuf, Vec<FakeEntry>>,
    fail_extract: bool,
    fail_convert: bool,
    pub lists: RefCell<Vec<PathBuf>>,
    pub extracts: RefCell<Vec<RecordedExtract>>,
    pub conversions: RefCell<Vec<(PathBuf, PathBuf)>>,
    /// Unsafe entries that were not excluded and would have left the target.
    pub escaped: RefCell<Vec<String>>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive(mut self, archive: impl Into<PathBuf>, entries: Vec<FakeEntry>) -> Self {
        self.archives.insert(archive.into(), entries);
        self
    }

    pub fn failing_extract(mut self) -> Self {
        self.fail_extract = true;
        self
    }

    pub fn failing_convert(mut self) -> Self {
        self.fail_convert = true;
        self
    }
}

impl ToolRunner for FakeTools {
    fn list_entries(&self, archive: &Path, _compression: LayerCompression) -> Result<EntryStream> {
        self.lists.borrow_mut().push(archive.to_path_buf());
        let entries = self
            .archives
            .get(archive)
            .ok_or_else(|| ImageError::tool("tar", format!("{}: cannot open", archive.display())))?;
        let paths: Vec<String> = entries.iter().map(|e| e.path.clone()).collect();
        Ok(Box::new(paths.into_iter().map(Ok::<String, ImageError>)))
    }

    fn extract(&self, request: &ExtractRequest<'_>) -> Result<()> {
        self.extracts.borrow_mut().push(RecordedExtract {
            archive: request.archive.to_path_buf(),
            target: request.target.to_path_buf(),
            compression: request.compression,
            excludes: request.excludes.to_vec(),
            preserve_ownership: request.preserve_ownership,
        });
        if self.fail_extract {
            return Err(ImageError::tool("tar", "exit status: 2"));
        }

        let entries = self
            .archives
            .get(request.archive)
            .ok_or_else(|| ImageError::tool("tar", "cannot open archive"))?;

        let patterns: Vec<Pattern> = request
            .excludes
            .iter()
            .map(|exclude| tar_pattern(exclude))
            .collect::<Result<_>>()?;

        for entry in entries {
            let raw = entry.path.as_str();
            if patterns.iter().any(|pattern| excluded_by(pattern, raw)) {
                continue;
            }
            let stripped = raw.strip_prefix("./").unwrap_or(raw);
            if stripped.starts_with('/') || stripped.split('/').any(|s| s == "..") {
                self.escaped.borrow_mut().push(raw.to_string());
                continue;
            }

            let rel = stripped.trim_end_matches('/');
            if rel.is_empty() || rel == "." {
                continue;
            }
            let dest = request.target.join(rel);
            match &entry.contents {
                None => fs::create_dir_all(&dest).map_err(|e| ImageError::fs(&dest, e))?,
                Some(bytes) => {
                    if let Some(parent) = dest.parent() {
                        fs::create_dir_all(parent).map_err(|e| ImageError::fs(parent, e))?;
                    }
                    fs::write(&dest, bytes).map_err(|e| ImageError::fs(&dest, e))?;
                }
            }
        }
        Ok(())
    }

    fn convert_disk(&self, source: &Path, destination: &Path) -> Result<()> {
        self.conversions
            .borrow_mut()
            .push((source.to_path_buf(), destination.to_path_buf()));
        if self.fail_convert {
            return Err(ImageError::tool("qemu-img", "exit status: 1"));
        }
        // The converter reads the chain through the link.
        let data = fs::read(source).map_err(|e| ImageError::fs(source, e))?;
        let mut standalone = b"QFI\xfb".to_vec();
        standalone.extend_from_slice(&data);
        fs::write(destination, standalone).map_err(|e| ImageError::fs(destination, e))
    }
}

/// Translate a `tar` wildcard into a glob pattern. A backslash makes the
/// next character literal.
fn tar_pattern(exclude: &str) -> Result<Pattern> {
    let mut glob = String::with_capacity(exclude.len());
    let mut chars = exclude.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    glob.push_str(&Pattern::escape(&next.to_string()));
                }
            }
            _ => glob.push(c),
        }
    }
    Pattern::new(&glob).map_err(|e| ImageError::tool("tar", format!("{exclude}: {e}")))
}

/// Unanchored exclude matching: the pattern may match the whole member name
/// or any suffix that starts after a `/`. `*` also matches `/`.
fn excluded_by(pattern: &Pattern, path: &str) -> bool {
    let path = path.trim_end_matches('/');
    pattern.matches(path)
        || path
            .match_indices('/')
            .any(|(i, _)| pattern.matches(&path[i + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn excluded(exclude: &str, path: &str) -> bool {
        excluded_by(&tar_pattern(exclude).unwrap(), path)
    }

    #[test]
    fn test_excluded_by() {
        assert!(excluded(".wh.*", ".wh.foo"));
        assert!(excluded(".wh.*", "./.wh.foo"));
        assert!(excluded(".wh.*", "dir/.wh.foo"));
        assert!(excluded("*/.wh..wh..opq", "dir/.wh..wh..opq"));
        assert!(!excluded(".wh.*", "dir/file.wh.x"));
        assert!(!excluded(".wh..wh..opq", "dir/file"));
    }

    #[test]
    fn test_excluded_by_wildcards() {
        // An unescaped bracket is a character class, as in tar.
        assert!(!excluded("/etc/pass[w]d", "/etc/pass[w]d"));
        assert!(excluded("/etc/pass[w]d", "/etc/passwd"));
        assert!(excluded("/etc/pass\\[w]d", "/etc/pass[w]d"));
        assert!(!excluded("/etc/pass\\[w]d", "/etc/passwd"));
        assert!(excluded("/opt/\\*", "/opt/*"));
        assert!(!excluded("/opt/\\*", "/opt/file"));
        assert!(excluded("../up\\?", "../up?"));
    }
}
