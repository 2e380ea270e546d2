//! The sync engine: one value per project, owning the upstream handle.
//!
//! ```text
//! install  upstream ──copy──▶ baseline, local; write meta
//! status   diff(baseline, upstream), diff(baseline, local)
//! plan     three-way merge of the two diffs
//! apply    backup local ▶ write take_upstream paths ▶ rebuild baseline ▶ stamp meta
//! ```

use crate::apply::{ApplyReport, Applier};
use crate::backup::{Backup, BackupManager};
use crate::config::Settings;
use crate::diff::{diff_trees, Change, ChangeSummary};
use crate::error::{Result, WmError};
use crate::meta::Meta;
use crate::paths;
use crate::plan::{build_plan, Plan};
use crate::tree::{DirTree, EntryKind, TreeSource};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_PRODUCT: &str = "claude-wm";

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub version: String,
    /// Files copied into `.claude/`.
    pub written: Vec<String>,
    /// Pre-existing local files that differ from upstream and were left as they are.
    pub kept: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Uninstalled,
    Synced,
    DriftedLocal,
    DriftedUpstream,
    DriftedBoth,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Uninstalled => "uninstalled",
            SyncState::Synced => "synced",
            SyncState::DriftedLocal => "drifted (local)",
            SyncState::DriftedUpstream => "drifted (upstream)",
            SyncState::DriftedBoth => "drifted (local + upstream)",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub installed: Option<Meta>,
    /// Version of the bundle compiled into this build.
    pub upstream_version: String,
    /// `diff(baseline, upstream)`.
    pub upstream_changes: Vec<Change>,
    /// `diff(baseline, local)`.
    pub local_changes: Vec<Change>,
}

impl Status {
    pub fn sync_state(&self) -> SyncState {
        if self.installed.is_none() {
            return SyncState::Uninstalled;
        }
        match (
            self.local_changes.is_empty(),
            self.upstream_changes.is_empty(),
        ) {
            (true, true) => SyncState::Synced,
            (false, true) => SyncState::DriftedLocal,
            (true, false) => SyncState::DriftedUpstream,
            (false, false) => SyncState::DriftedBoth,
        }
    }

    pub fn upstream_summary(&self) -> ChangeSummary {
        ChangeSummary::of(&self.upstream_changes)
    }

    pub fn local_summary(&self) -> ChangeSummary {
        ChangeSummary::of(&self.local_changes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub restored: Backup,
    /// Snapshot of `.claude/` taken just before the restore.
    pub safety_backup: Backup,
    pub files: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine<U: TreeSource> {
    upstream: U,
    root: PathBuf,
    product: String,
    version: String,
    backups: Option<bool>,
}

impl<U: TreeSource> Engine<U> {
    pub fn new(upstream: U, root: impl Into<PathBuf>) -> Self {
        Self {
            upstream,
            root: root.into(),
            product: DEFAULT_PRODUCT.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            backups: None,
        }
    }

    /// Version recorded in `meta.json` after install and apply.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Force backups on or off, overriding `.wm/config.yaml`.
    pub fn with_backups(mut self, enabled: bool) -> Self {
        self.backups = Some(enabled);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    pub fn baseline(&self) -> DirTree {
        DirTree::new("baseline", paths::baseline_dir(&self.root))
    }

    pub fn local(&self) -> DirTree {
        DirTree::new("local", paths::local_dir(&self.root))
    }

    pub fn backup_manager(&self) -> BackupManager {
        BackupManager::new(paths::backups_dir(&self.root))
    }

    /// Installed metadata. Without a baseline there is no common ancestor to
    /// merge against, so a missing baseline counts as not installed.
    fn load_meta(&self) -> Result<Meta> {
        let meta = Meta::load(&paths::meta_path(&self.root))?;
        meta.check_schema()?;
        if !self.baseline().exists() {
            return Err(WmError::NotInstalled);
        }
        Ok(meta)
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Seed baseline and local from upstream and record the installed version.
    pub fn install(&self) -> Result<InstallReport> {
        let meta_path = paths::meta_path(&self.root);
        if meta_path.exists() {
            return Err(WmError::AlreadyInstalled(meta_path));
        }

        let local = self.local();
        let mut written = Vec::new();
        let mut kept = Vec::new();
        for entry in self.upstream.entries()? {
            if entry.kind == EntryKind::Dir {
                continue;
            }
            match local.hash_of(&entry.path)? {
                Some(hash) if hash == entry.content_hash => {}
                Some(_) => {
                    tracing::warn!(path = %entry.path, "existing local file differs from upstream, keeping it");
                    kept.push(entry.path);
                }
                None => {
                    let data = self.upstream.read(&entry.path)?;
                    local.write(&entry.path, &data, entry.executable)?;
                    written.push(entry.path);
                }
            }
        }

        self.baseline().replace_from(&self.upstream)?;
        Meta::new(&self.product, &self.version).save(&meta_path)?;

        tracing::info!(
            version = %self.version,
            written = written.len(),
            kept = kept.len(),
            "installed"
        );
        Ok(InstallReport {
            version: self.version.clone(),
            written,
            kept,
        })
    }

    /// Current drift on both sides. Side-effect free; a project without meta
    /// or baseline reports no changes.
    pub fn status(&self) -> Result<Status> {
        let mut installed = Meta::load_optional(&paths::meta_path(&self.root))?;
        if let Some(meta) = &installed {
            meta.check_schema()?;
        }
        let baseline = self.baseline();
        if installed.is_some() && !baseline.exists() {
            tracing::warn!(path = %baseline.root().display(), "baseline missing, treating project as not installed");
            installed = None;
        }

        let (upstream_changes, local_changes) = if installed.is_some() {
            (
                diff_trees(&baseline, &self.upstream)?,
                diff_trees(&baseline, &self.local())?,
            )
        } else {
            (Vec::new(), Vec::new())
        };
        Ok(Status {
            installed,
            upstream_version: self.version.clone(),
            upstream_changes,
            local_changes,
        })
    }

    pub fn plan(&self) -> Result<Plan> {
        self.load_meta()?;
        build_plan(&self.upstream, &self.baseline(), &self.local())
    }

    pub fn apply(&self, plan: &Plan) -> Result<ApplyReport> {
        let mut meta = self.load_meta()?;
        let enabled = match self.backups {
            Some(enabled) => enabled,
            None => Settings::load(&self.root)?.backups.enabled,
        };
        let manager = self.backup_manager();
        let baseline = self.baseline();
        let local = self.local();
        let meta_path = paths::meta_path(&self.root);

        let applier = Applier {
            upstream: &self.upstream,
            baseline: &baseline,
            local: &local,
            backups: enabled.then_some(&manager),
            meta_path: &meta_path,
            version: &self.version,
        };
        applier.apply(plan, &mut meta)
    }

    /// Plan and apply in one step.
    pub fn update(&self) -> Result<(Plan, ApplyReport)> {
        let plan = self.plan()?;
        let report = self.apply(&plan)?;
        Ok((plan, report))
    }

    pub fn backups(&self) -> Result<Vec<Backup>> {
        self.backup_manager().list()
    }

    /// Extract the named backup over `.claude/`, snapshotting the current
    /// state first so the restore itself can be undone.
    pub fn restore(&self, name: &str) -> Result<RestoreReport> {
        let manager = self.backup_manager();
        let backup = manager
            .find(name)?
            .ok_or_else(|| WmError::BackupNotFound(name.to_string()))?;
        let local = self.local();
        let safety_backup = manager.create(&local, Utc::now())?;
        let files = manager.restore(&backup, &local)?;
        Ok(RestoreReport {
            restored: backup,
            safety_backup,
            files,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
