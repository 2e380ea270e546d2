//! Timestamped snapshots of the local tree, taken before any mutating apply.
//!
//! Archives are gzip-compressed tarballs in `.wm/backups/`, named
//! `backup-YYYY-MM-DD_HH-MM-SS.tar.gz` (UTC). Pruning old archives is left to
//! the caller.

use crate::error::{IoContext, Result, WmError};
use crate::tree::{DirTree, EntryKind, TreeSource};
use crate::{io, paths};
use chrono::{DateTime, NaiveDateTime, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const NAME_PREFIX: &str = "backup-";
const NAME_SUFFIX: &str = ".tar.gz";
const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const STAMP_LEN: usize = 19;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backup {
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Archive every entry of `source` into a new timestamped backup.
    pub fn create(&self, source: &dyn TreeSource, at: DateTime<Utc>) -> Result<Backup> {
        io::ensure_dir(&self.dir)?;
        let (name, path) = self.unused_name(at);

        let tmp = NamedTempFile::new_in(&self.dir).io_ctx("create temp file in", &self.dir)?;
        let mut builder = tar::Builder::new(GzEncoder::new(tmp, Compression::default()));
        let mtime = at.timestamp().max(0) as u64;
        let mut files = 0usize;

        for entry in source.entries()? {
            let mut header = tar::Header::new_gnu();
            header.set_mtime(mtime);
            match entry.kind {
                EntryKind::Dir => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_mode(0o755);
                    header.set_size(0);
                    builder
                        .append_data(&mut header, format!("{}/", entry.path), std::io::empty())
                        .io_ctx("archive", &path)?;
                }
                EntryKind::File => {
                    let data = source.read(&entry.path)?;
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_mode(if entry.executable { 0o755 } else { 0o644 });
                    header.set_size(data.len() as u64);
                    builder
                        .append_data(&mut header, &entry.path, data.as_slice())
                        .io_ctx("archive", &path)?;
                    files += 1;
                }
            }
        }

        let tmp = builder
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .io_ctx("finish archive", &path)?;
        tmp.persist_noclobber(&path)
            .map_err(|e| e.error)
            .io_ctx("persist", &path)?;

        let size = std::fs::metadata(&path).io_ctx("stat", &path)?.len();
        tracing::info!(backup = %path.display(), files, "backup created");
        Ok(Backup {
            name,
            path,
            created_at: at,
            size,
        })
    }

    /// All backups in the directory, newest first. A missing directory yields none.
    pub fn list(&self) -> Result<Vec<Backup>> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WmError::io("read directory", &self.dir, e)),
        };

        let mut found = Vec::new();
        for entry in read_dir {
            let entry = entry.io_ctx("read directory", &self.dir)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some((created_at, seq)) = parse_name(&name) else {
                continue;
            };
            let size = entry.metadata().io_ctx("stat", &entry.path())?.len();
            found.push((
                seq,
                Backup {
                    name,
                    path: entry.path(),
                    created_at,
                    size,
                },
            ));
        }
        found.sort_by(|(sa, a), (sb, b)| b.created_at.cmp(&a.created_at).then(sb.cmp(sa)));
        Ok(found.into_iter().map(|(_, b)| b).collect())
    }

    /// Look up a backup by file name.
    pub fn find(&self, name: &str) -> Result<Option<Backup>> {
        Ok(self.list()?.into_iter().find(|b| b.name == name))
    }

    /// Extract `backup` over `target`. Files in `target` that are not in the
    /// archive are left in place. Returns the number of files restored.
    pub fn restore(&self, backup: &Backup, target: &DirTree) -> Result<usize> {
        let file = std::fs::File::open(&backup.path).io_ctx("open", &backup.path)?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut restored = 0usize;

        for entry in archive.entries().io_ctx("read archive", &backup.path)? {
            let mut entry = entry.io_ctx("read archive", &backup.path)?;
            let raw = entry.path().io_ctx("read archive", &backup.path)?;
            let rel = raw
                .components()
                .map(|c| c.as_os_str().to_str())
                .collect::<Option<Vec<_>>>()
                .map(|parts| parts.join("/"))
                .ok_or_else(|| WmError::InvalidPath(raw.display().to_string()))?;
            if !paths::is_safe_relative(&rel) {
                return Err(WmError::InvalidPath(rel));
            }

            match entry.header().entry_type() {
                tar::EntryType::Directory => {
                    io::ensure_dir(&paths::join_rel(target.root(), &rel))?;
                }
                tar::EntryType::Regular => {
                    let executable = entry.header().mode().map(|m| m & 0o111 != 0).unwrap_or(false);
                    let mut data = Vec::new();
                    entry
                        .read_to_end(&mut data)
                        .io_ctx("read archive", &backup.path)?;
                    target.write(&rel, &data, executable)?;
                    restored += 1;
                }
                other => tracing::debug!(path = %rel, kind = ?other, "skipping archive entry"),
            }
        }

        tracing::info!(backup = %backup.name, files = restored, "backup restored");
        Ok(restored)
    }

    fn unused_name(&self, at: DateTime<Utc>) -> (String, PathBuf) {
        let stamp = at.format(STAMP_FORMAT).to_string();
        let mut seq = 0u32;
        loop {
            let name = if seq == 0 {
                format!("{NAME_PREFIX}{stamp}{NAME_SUFFIX}")
            } else {
                format!("{NAME_PREFIX}{stamp}-{seq}{NAME_SUFFIX}")
            };
            let path = self.dir.join(&name);
            if !path.exists() {
                return (name, path);
            }
            seq += 1;
        }
    }
}

/// Parse `backup-<stamp>[-<seq>].tar.gz` into its timestamp and sequence number.
fn parse_name(name: &str) -> Option<(DateTime<Utc>, u32)> {
    let stem = name.strip_prefix(NAME_PREFIX)?.strip_suffix(NAME_SUFFIX)?;
    let stamp = stem.get(..STAMP_LEN)?;
    let created = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?.and_utc();
    let seq = match &stem[STAMP_LEN..] {
        "" => 0,
        rest => rest.strip_prefix('-')?.parse().ok()?,
    };
    Some((created, seq))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
