//! File-tree backends shared by the diff engine, planner and applier.
//!
//! Every tree (the embedded upstream bundle, the on-disk baseline and local
//! copies, and in-memory fixtures) is reached through [`TreeSource`], so the
//! reconciliation code never cares which concrete backend it is reading.

use crate::error::{IoContext, Result, WmError};
use crate::{io, paths};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// ---------------------------------------------------------------------------
// FileEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Dir,
}

/// One record of a tree enumeration. Identity is `path`; content equality
/// is by `content_hash`. Directories carry an empty hash and zero size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub kind: EntryKind,
    pub content_hash: String,
    pub size: u64,
    pub executable: bool,
}

impl FileEntry {
    pub fn file(path: impl Into<String>, data: &[u8], executable: bool) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            content_hash: content_hash(data),
            size: data.len() as u64,
            executable,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Dir,
            content_hash: String::new(),
            size: 0,
            executable: false,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Lowercase hex SHA-256 of `data`.
pub fn content_hash(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

// ---------------------------------------------------------------------------
// TreeSource
// ---------------------------------------------------------------------------

/// Read-only view of a labeled file tree.
pub trait TreeSource {
    /// Short name used in logs and error messages ("upstream", "baseline", ...).
    fn label(&self) -> &str;

    /// Every file and directory under the root, sorted by path.
    /// A missing root yields an empty list.
    fn entries(&self) -> Result<Vec<FileEntry>>;

    /// Full content of the file at `path`.
    fn read(&self, path: &str) -> Result<Vec<u8>>;
}

/// Parent directories implied by a set of file paths, as `Dir` entries.
pub(crate) fn implied_dirs<'a>(files: impl Iterator<Item = &'a str>) -> Vec<FileEntry> {
    let mut dirs = BTreeSet::new();
    for path in files {
        let mut end = 0;
        while let Some(pos) = path[end..].find('/') {
            end += pos;
            dirs.insert(path[..end].to_string());
            end += 1;
        }
    }
    dirs.into_iter().map(FileEntry::dir).collect()
}

pub(crate) fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| a.path.cmp(&b.path));
}

fn not_found(label: &str, path: &str) -> WmError {
    WmError::io(
        "read",
        format!("{label}:{path}"),
        std::io::Error::new(std::io::ErrorKind::NotFound, "no such file in tree"),
    )
}

// ---------------------------------------------------------------------------
// DirTree
// ---------------------------------------------------------------------------

/// An OS directory. Read side implements [`TreeSource`]; the write side is
/// used by the applier for local and baseline.
#[derive(Debug, Clone)]
pub struct DirTree {
    label: String,
    root: PathBuf,
}

impl DirTree {
    pub fn new(label: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if !paths::is_safe_relative(path) {
            return Err(WmError::InvalidPath(path.to_string()));
        }
        Ok(paths::join_rel(&self.root, path))
    }

    /// Content hash of `path`, or `None` when it is not a regular file.
    pub fn hash_of(&self, path: &str) -> Result<Option<String>> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Ok(None);
        }
        let data = std::fs::read(&full).io_ctx("read", &full)?;
        Ok(Some(content_hash(&data)))
    }

    /// Write `data` to `path`, creating parent directories as needed.
    pub fn write(&self, path: &str, data: &[u8], executable: bool) -> Result<()> {
        let full = self.resolve(path)?;
        io::atomic_write(&full, data)?;
        if executable {
            io::set_executable(&full)?;
        }
        Ok(())
    }

    /// Replace this directory wholesale with the content of `source`.
    ///
    /// The copy is staged in a sibling directory and swapped in only once
    /// every file has been written, so a failed copy leaves the old tree intact.
    pub fn replace_from(&self, source: &dyn TreeSource) -> Result<usize> {
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.label.clone());
        let staging = self.root.with_file_name(format!(".{name}.staging"));
        io::remove_dir_if_exists(&staging)?;

        let staged = DirTree::new(format!("{}-staging", self.label), &staging);
        let copied = match staged.copy_from(source) {
            Ok(n) => n,
            Err(e) => {
                if let Err(cleanup) = io::remove_dir_if_exists(&staging) {
                    tracing::warn!(path = %staging.display(), "failed to clean staging dir: {cleanup}");
                }
                return Err(e);
            }
        };

        io::remove_dir_if_exists(&self.root)?;
        std::fs::rename(&staging, &self.root).io_ctx("rename", &staging)?;
        tracing::debug!(tree = %self.label, files = copied, "tree replaced");
        Ok(copied)
    }

    fn copy_from(&self, source: &dyn TreeSource) -> Result<usize> {
        io::ensure_dir(&self.root)?;
        let mut copied = 0;
        for entry in source.entries()? {
            match entry.kind {
                EntryKind::Dir => io::ensure_dir(&self.resolve(&entry.path)?)?,
                EntryKind::File => {
                    let data = source.read(&entry.path)?;
                    self.write(&entry.path, &data, entry.executable)?;
                    copied += 1;
                }
            }
        }
        Ok(copied)
    }
}

impl TreeSource for DirTree {
    fn label(&self) -> &str {
        &self.label
    }

    fn entries(&self) -> Result<Vec<FileEntry>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.root).to_path_buf();
                WmError::io("walk", path, e.into())
            })?;

            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|_| WmError::InvalidPath(entry.path().display().to_string()))?;
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_str())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| WmError::InvalidPath(rel.display().to_string()))?
                .join("/");

            let file_type = entry.file_type();
            if file_type.is_dir() {
                entries.push(FileEntry::dir(rel));
            } else if file_type.is_file() {
                let data = std::fs::read(entry.path()).io_ctx("read", entry.path())?;
                let meta = entry.metadata().map_err(|e| {
                    WmError::io("stat", entry.path(), e.into())
                })?;
                entries.push(FileEntry::file(rel, &data, io::is_executable(&meta)));
            } else {
                tracing::debug!(path = %entry.path().display(), "skipping non-regular file");
            }
        }

        sort_entries(&mut entries);
        Ok(entries)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        std::fs::read(&full).io_ctx("read", &full)
    }
}

// ---------------------------------------------------------------------------
// MemTree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MemFile {
    data: Vec<u8>,
    executable: bool,
}

/// In-memory tree for synthetic upstreams and test fixtures.
#[derive(Debug, Clone, Default)]
pub struct MemTree {
    label: String,
    files: BTreeMap<String, MemFile>,
}

impl MemTree {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, path: &str, data: impl AsRef<[u8]>) -> Self {
        self.insert(path, data);
        self
    }

    pub fn insert(&mut self, path: &str, data: impl AsRef<[u8]>) {
        self.files.insert(
            path.to_string(),
            MemFile {
                data: data.as_ref().to_vec(),
                executable: false,
            },
        );
    }

    pub fn insert_executable(&mut self, path: &str, data: impl AsRef<[u8]>) {
        self.files.insert(
            path.to_string(),
            MemFile {
                data: data.as_ref().to_vec(),
                executable: true,
            },
        );
    }
}

impl TreeSource for MemTree {
    fn label(&self) -> &str {
        &self.label
    }

    fn entries(&self) -> Result<Vec<FileEntry>> {
        let mut entries = implied_dirs(self.files.keys().map(String::as_str));
        entries.extend(
            self.files
                .iter()
                .map(|(path, f)| FileEntry::file(path.clone(), &f.data, f.executable)),
        );
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .get(path)
            .map(|f| f.data.clone())
            .ok_or_else(|| not_found(&self.label, path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
