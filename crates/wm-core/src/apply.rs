//! Executes a [`Plan`] against the local and baseline trees.

use crate::backup::{Backup, BackupManager};
use crate::diff::{diff_indexes, index_tree, Change, TreeIndex};
use crate::error::{Result, WmError};
use crate::meta::Meta;
use crate::plan::{Action, Decision, Plan};
use crate::tree::{DirTree, FileEntry, TreeSource};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<Backup>,
    /// Local paths overwritten with upstream content.
    pub written: Vec<String>,
    /// Paths left untouched because both sides changed.
    pub conflicts: Vec<Decision>,
    /// Paths upstream no longer ships; local copies are kept.
    pub retired: Vec<String>,
    /// Local-only edits that were left alone.
    pub preserved: Vec<String>,
    /// Files in the rebuilt baseline; zero when the baseline was not touched.
    pub baseline_files: usize,
    pub installed_version: String,
}

impl ApplyReport {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Everything the applier writes to, bundled so a plan can be applied in one call.
pub struct Applier<'a> {
    pub upstream: &'a dyn TreeSource,
    pub baseline: &'a DirTree,
    pub local: &'a DirTree,
    /// `None` disables the pre-apply snapshot.
    pub backups: Option<&'a BackupManager>,
    pub meta_path: &'a Path,
    pub version: &'a str,
}

impl Applier<'_> {
    pub fn apply(&self, plan: &Plan, meta: &mut Meta) -> Result<ApplyReport> {
        let preserved: Vec<String> = plan.preserved.iter().map(|d| d.path.clone()).collect();

        let upstream_files: BTreeMap<String, FileEntry> = self
            .upstream
            .entries()?
            .into_iter()
            .filter(FileEntry::is_file)
            .map(|e| (e.path.clone(), e))
            .collect();
        self.check_fresh(plan, &upstream_files)?;

        if plan.is_empty() && plan.upstream_changes.is_empty() {
            tracing::info!("nothing to apply");
            return Ok(ApplyReport {
                preserved,
                installed_version: meta.installed_version.clone(),
                ..ApplyReport::default()
            });
        }

        let mut report = ApplyReport {
            preserved,
            ..ApplyReport::default()
        };

        if !plan.is_empty() {
            if let Some(backups) = self.backups {
                report.backup = Some(backups.create(self.local, Utc::now())?);
            }
        }

        for decision in &plan.merge {
            match decision.action {
                Action::TakeUpstream => {
                    let data = self.upstream.read(&decision.path)?;
                    let executable = upstream_files
                        .get(&decision.path)
                        .is_some_and(|e| e.executable);
                    self.local.write(&decision.path, &data, executable)?;
                    tracing::debug!(path = %decision.path, "took upstream");
                    report.written.push(decision.path.clone());
                }
                Action::Conflict => {
                    tracing::warn!(path = %decision.path, reason = %decision.reason, "conflict, keeping local");
                    report.conflicts.push(decision.clone());
                }
                Action::Delete => {
                    tracing::debug!(path = %decision.path, "retired upstream file");
                    report.retired.push(decision.path.clone());
                }
                Action::KeepLocal | Action::NoOp => {}
            }
        }

        report.baseline_files = self.baseline.replace_from(self.upstream)?;

        meta.stamp(self.version);
        meta.save(self.meta_path)?;
        report.installed_version = meta.installed_version.clone();

        tracing::info!(
            written = report.written.len(),
            conflicts = report.conflicts.len(),
            retired = report.retired.len(),
            version = %report.installed_version,
            "plan applied"
        );
        Ok(report)
    }

    /// Refuse a plan whose view of upstream or local no longer matches disk.
    fn check_fresh(&self, plan: &Plan, upstream_files: &BTreeMap<String, FileEntry>) -> Result<()> {
        let upstream_index: TreeIndex = upstream_files
            .iter()
            .map(|(path, e)| (path.clone(), e.content_hash.clone()))
            .collect();
        let upstream_now = diff_indexes(&index_tree(self.baseline)?, &upstream_index);
        if let Some(path) = first_difference(&plan.upstream_changes, &upstream_now) {
            return Err(WmError::StalePlan(path.to_string()));
        }

        for decision in plan.with_action(Action::TakeUpstream) {
            let path = decision.path.as_str();
            let Some(change) = &decision.upstream_change else {
                return Err(WmError::StalePlan(path.to_string()));
            };
            // Local was untouched when the plan was built, so it held the baseline content.
            if self.local.hash_of(path)? != change.from_hash {
                return Err(WmError::StalePlan(path.to_string()));
            }
        }
        Ok(())
    }
}

/// First path where two sorted change lists disagree.
fn first_difference<'c>(planned: &'c [Change], current: &'c [Change]) -> Option<&'c str> {
    let mut planned = planned.iter();
    let mut current = current.iter();
    loop {
        match (planned.next(), current.next()) {
            (None, None) => return None,
            (Some(a), Some(b)) if a == b => continue,
            (Some(a), Some(b)) => return Some(a.path.as_str().min(b.path.as_str())),
            (Some(c), None) | (None, Some(c)) => return Some(c.path.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
