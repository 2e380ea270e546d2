//! File-level tree comparison.
//!
//! [`diff_trees`] is the single directional primitive used everywhere a delta
//! between two trees is needed. The result describes how to turn `from` into
//! `to`: `Added` means "present in `to` only", `Deleted` means "present in
//! `from` only". The direction is therefore significant. Status and the
//! planner both call it as `diff_trees(baseline, other)` so that "added"
//! always reads as "added since the last sync".

use crate::error::Result;
use crate::tree::TreeSource;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// ChangeType / Change
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
        }
    }

    /// One-character marker for listings.
    pub fn symbol(self) -> char {
        match self {
            ChangeType::Added => '+',
            ChangeType::Modified => 'M',
            ChangeType::Deleted => '-',
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_hash: Option<String>,
}

impl Change {
    /// Hash the path ends up with once the change is applied; `None` for a deletion.
    pub fn result_hash(&self) -> Option<&str> {
        self.to_hash.as_deref()
    }
}

// ---------------------------------------------------------------------------
// TreeIndex
// ---------------------------------------------------------------------------

/// Path → content hash for the regular files of a tree. Directories are dropped.
pub type TreeIndex = BTreeMap<String, String>;

pub fn index_tree(tree: &dyn TreeSource) -> Result<TreeIndex> {
    Ok(tree
        .entries()?
        .into_iter()
        .filter(|e| e.is_file())
        .map(|e| (e.path, e.content_hash))
        .collect())
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Compare two trees and describe how to turn `from` into `to`, sorted by path.
pub fn diff_trees(from: &dyn TreeSource, to: &dyn TreeSource) -> Result<Vec<Change>> {
    let from_index = index_tree(from)?;
    let to_index = index_tree(to)?;
    let changes = diff_indexes(&from_index, &to_index);
    tracing::debug!(
        from = from.label(),
        to = to.label(),
        changes = changes.len(),
        "trees compared"
    );
    Ok(changes)
}

/// Index-level form of [`diff_trees`].
pub fn diff_indexes(from: &TreeIndex, to: &TreeIndex) -> Vec<Change> {
    let paths: BTreeSet<&String> = from.keys().chain(to.keys()).collect();
    paths
        .into_iter()
        .filter_map(|path| {
            let change_type = match (from.get(path), to.get(path)) {
                (Some(_), None) => ChangeType::Deleted,
                (None, Some(_)) => ChangeType::Added,
                (Some(a), Some(b)) if a != b => ChangeType::Modified,
                _ => return None,
            };
            Some(Change {
                path: path.clone(),
                change_type,
                from_hash: from.get(path).cloned(),
                to_hash: to.get(path).cloned(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ChangeSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub total: usize,
}

impl ChangeSummary {
    pub fn of(changes: &[Change]) -> Self {
        let mut summary = ChangeSummary::default();
        for c in changes {
            match c.change_type {
                ChangeType::Added => summary.added += 1,
                ChangeType::Modified => summary.modified += 1,
                ChangeType::Deleted => summary.deleted += 1,
            }
            summary.total += 1;
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
