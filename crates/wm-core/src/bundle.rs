use crate::error::{Result, WmError};
use crate::tree::{self, FileEntry, TreeSource};
use rust_embed::Embed;
use std::marker::PhantomData;

/// The read-only upstream bundle compiled into the binary.
///
/// `E` is any `#[derive(Embed)]` asset type; only files under `prefix`
/// (e.g. `system/`) belong to the tree, and paths are reported relative to it.
pub struct EmbeddedTree<E: Embed> {
    label: String,
    prefix: String,
    _bundle: PhantomData<E>,
}

impl<E: Embed> EmbeddedTree<E> {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            label: "upstream".to_string(),
            prefix: prefix.into(),
            _bundle: PhantomData,
        }
    }

    fn full_name(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }
}

impl<E: Embed> TreeSource for EmbeddedTree<E> {
    fn label(&self) -> &str {
        &self.label
    }

    fn entries(&self) -> Result<Vec<FileEntry>> {
        let mut files = Vec::new();
        for name in E::iter() {
            let Some(rel) = name.strip_prefix(self.prefix.as_str()) else {
                continue;
            };
            if rel.is_empty() {
                continue;
            }
            let file = E::get(&name).ok_or_else(|| WmError::InvalidPath(name.to_string()))?;
            // Embedded assets carry no mode bits; scripts are recognised by their shebang.
            let executable = file.data.starts_with(b"#!");
            files.push(FileEntry::file(rel, &file.data, executable));
        }

        let mut entries = tree::implied_dirs(files.iter().map(|f| f.path.as_str()));
        entries.extend(files);
        tree::sort_entries(&mut entries);
        Ok(entries)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        E::get(&self.full_name(path))
            .map(|f| f.data.into_owned())
            .ok_or_else(|| {
                WmError::io(
                    "read",
                    format!("{}:{}", self.label, path),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "not in embedded bundle"),
                )
            })
    }
}
