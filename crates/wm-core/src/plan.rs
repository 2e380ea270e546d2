//! Three-way merge planning.
//!
//! The planner never writes. It compares upstream and local against the
//! common baseline and decides, per path, what the applier should do. The
//! policy is "ours"-biased: whenever upstream and local disagree, local wins
//! and the path is reported as a conflict.

use crate::diff::{diff_indexes, index_tree, Change, ChangeType, TreeIndex};
use crate::error::Result;
use crate::tree::TreeSource;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Copy upstream content into local.
    TakeUpstream,
    /// Local-only drift; nothing to apply.
    KeepLocal,
    /// Both sides changed differently; local is left alone and reported.
    Conflict,
    /// Both sides converged on the same result.
    NoOp,
    /// Upstream retired a path local never touched; baseline drops it, local keeps the file.
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::TakeUpstream => "take_upstream",
            Action::KeepLocal => "keep_local",
            Action::Conflict => "conflict",
            Action::NoOp => "no_op",
            Action::Delete => "delete",
        }
    }

    /// Whether the applier has work to do for this action.
    pub fn is_actionable(self) -> bool {
        matches!(self, Action::TakeUpstream | Action::Conflict | Action::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Decision / Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub path: String,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_change: Option<Change>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_change: Option<Change>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub take_upstream: usize,
    pub keep_local: usize,
    pub conflict: usize,
    pub delete: usize,
    pub no_op: usize,
    /// Number of decisions in `merge`.
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// `diff(baseline, upstream)`: what upstream changed since the last sync.
    pub upstream_changes: Vec<Change>,
    /// `diff(baseline, local)`: what the user changed since the last sync.
    pub local_changes: Vec<Change>,
    /// Path-ordered decisions the applier acts on.
    pub merge: Vec<Decision>,
    /// Path-ordered `keep_local` decisions, reported only.
    pub preserved: Vec<Decision>,
    pub summary: PlanSummary,
}

impl Plan {
    /// True when applying the plan would not touch disk.
    pub fn is_empty(&self) -> bool {
        self.merge.is_empty()
    }

    pub fn with_action(&self, action: Action) -> impl Iterator<Item = &Decision> {
        self.merge.iter().filter(move |d| d.action == action)
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Compute the three-way plan for reconciling `upstream` into `local`.
pub fn build_plan(
    upstream: &dyn TreeSource,
    baseline: &dyn TreeSource,
    local: &dyn TreeSource,
) -> Result<Plan> {
    let upstream_index = index_tree(upstream)?;
    let baseline_index = index_tree(baseline)?;
    let local_index = index_tree(local)?;
    let plan = plan_from_indexes(&upstream_index, &baseline_index, &local_index);
    tracing::debug!(
        merge = plan.summary.total,
        conflicts = plan.summary.conflict,
        preserved = plan.preserved.len(),
        "plan built"
    );
    Ok(plan)
}

pub fn plan_from_indexes(upstream: &TreeIndex, baseline: &TreeIndex, local: &TreeIndex) -> Plan {
    let upstream_changes = diff_indexes(baseline, upstream);
    let local_changes = diff_indexes(baseline, local);

    let by_path_u: BTreeMap<&str, &Change> =
        upstream_changes.iter().map(|c| (c.path.as_str(), c)).collect();
    let by_path_l: BTreeMap<&str, &Change> =
        local_changes.iter().map(|c| (c.path.as_str(), c)).collect();
    let touched: BTreeSet<&str> = by_path_u.keys().chain(by_path_l.keys()).copied().collect();

    let mut merge = Vec::new();
    let mut preserved = Vec::new();
    let mut summary = PlanSummary::default();

    for path in touched {
        let u = by_path_u.get(path).copied();
        let l = by_path_l.get(path).copied();
        let (action, reason) = decide(u, l);

        match action {
            Action::TakeUpstream => summary.take_upstream += 1,
            Action::KeepLocal => summary.keep_local += 1,
            Action::Conflict => summary.conflict += 1,
            Action::Delete => summary.delete += 1,
            Action::NoOp => {
                summary.no_op += 1;
                continue;
            }
        }

        let decision = Decision {
            path: path.to_string(),
            action,
            upstream_change: u.cloned(),
            local_change: l.cloned(),
            reason: reason.to_string(),
        };
        tracing::debug!(path, action = %action, reason, "decision");
        if action.is_actionable() {
            merge.push(decision);
        } else {
            preserved.push(decision);
        }
    }
    summary.total = merge.len();

    Plan {
        upstream_changes,
        local_changes,
        merge,
        preserved,
        summary,
    }
}

/// Per-path three-way decision from the upstream and local changes
/// (each relative to baseline).
pub fn decide(upstream: Option<&Change>, local: Option<&Change>) -> (Action, &'static str) {
    match (upstream, local) {
        (None, None) => (Action::NoOp, "no changes in upstream or local"),
        (Some(u), None) => match u.change_type {
            ChangeType::Added => (Action::TakeUpstream, "new file from upstream"),
            ChangeType::Modified => (
                Action::TakeUpstream,
                "fast-forward upstream changes (local unchanged)",
            ),
            ChangeType::Deleted => (
                Action::Delete,
                "upstream removed file; local copy kept as user-owned",
            ),
        },
        (None, Some(l)) => match l.change_type {
            ChangeType::Added => (Action::KeepLocal, "user-created file"),
            ChangeType::Modified => (
                Action::KeepLocal,
                "preserve local modifications (upstream unchanged)",
            ),
            ChangeType::Deleted => (
                Action::KeepLocal,
                "local deletion respected (upstream unchanged)",
            ),
        },
        (Some(u), Some(l)) => {
            if u.result_hash() == l.result_hash() {
                return (Action::NoOp, "upstream and local converged");
            }
            let reason = match (u.change_type, l.change_type) {
                (ChangeType::Deleted, _) => "upstream deleted but local modified",
                (_, ChangeType::Deleted) => "local deleted but upstream modified",
                (ChangeType::Added, ChangeType::Added) => "added in both with different content",
                _ => "both upstream and local modified",
            };
            (Action::Conflict, reason)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MemTree;

    fn plan(upstream: &MemTree, baseline: &MemTree, local: &MemTree) -> Plan {
        build_plan(upstream, baseline, local).unwrap()
    }

    fn actions(plan: &Plan) -> Vec<(&str, Action)> {
        plan.merge
            .iter()
            .map(|d| (d.path.as_str(), d.action))
            .collect()
    }

    #[test]
    fn untouched_trees_give_empty_plan() {
        let tree = MemTree::new("t").with_file("README.md", "A");
        let p = plan(&tree, &tree, &tree);
        assert!(p.is_empty());
        assert!(p.preserved.is_empty());
        assert_eq!(p.summary, PlanSummary::default());
    }

    #[test]
    fn upstream_only_change_fast_forwards() {
        let baseline = MemTree::new("baseline").with_file("file.txt", "baseline content");
        let upstream = MemTree::new("upstream").with_file("file.txt", "upstream content");
        let local = baseline.clone();

        let p = plan(&upstream, &baseline, &local);
        assert_eq!(actions(&p), vec![("file.txt", Action::TakeUpstream)]);
        assert!(p.merge[0].reason.contains("fast-forward"));
        assert_eq!(p.upstream_changes.len(), 1);
        assert!(p.local_changes.is_empty());
    }

    #[test]
    fn upstream_addition_is_adopted() {
        let baseline = MemTree::new("baseline").with_file("README.md", "A");
        let upstream = baseline.clone().with_file("commands/new.md", "N");
        let p = plan(&upstream, &baseline, &baseline);
        assert_eq!(actions(&p), vec![("commands/new.md", Action::TakeUpstream)]);
        assert_eq!(p.summary.take_upstream, 1);
        assert_eq!(p.summary.total, 1);
    }

    #[test]
    fn local_only_change_is_preserved_not_merged() {
        let baseline = MemTree::new("baseline").with_file("file.txt", "baseline content");
        let local = MemTree::new("local")
            .with_file("file.txt", "local modification")
            .with_file("notes.txt", "mine");

        let p = plan(&baseline, &baseline, &local);
        assert!(p.is_empty());
        let kept: Vec<_> = p.preserved.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(kept, vec!["file.txt", "notes.txt"]);
        assert!(p.preserved.iter().all(|d| d.action == Action::KeepLocal));
        assert_eq!(p.summary.keep_local, 2);
    }

    #[test]
    fn divergent_edits_conflict() {
        let baseline = MemTree::new("baseline").with_file("README.md", "A");
        let upstream = MemTree::new("upstream").with_file("README.md", "B");
        let local = MemTree::new("local").with_file("README.md", "A+local");

        let p = plan(&upstream, &baseline, &local);
        assert_eq!(actions(&p), vec![("README.md", Action::Conflict)]);
        let d = &p.merge[0];
        assert_eq!(
            d.upstream_change.as_ref().map(|c| c.change_type),
            Some(ChangeType::Modified)
        );
        assert_eq!(
            d.local_change.as_ref().map(|c| c.change_type),
            Some(ChangeType::Modified)
        );
    }

    #[test]
    fn converging_edits_are_noop() {
        let baseline = MemTree::new("baseline").with_file("README.md", "A");
        let upstream = MemTree::new("upstream").with_file("README.md", "B");
        let local = MemTree::new("local").with_file("README.md", "B");

        let p = plan(&upstream, &baseline, &local);
        assert!(p.is_empty());
        assert_eq!(p.summary.no_op, 1);
    }

    #[test]
    fn upstream_deletion_of_untouched_file_is_delete() {
        let baseline = MemTree::new("baseline").with_file("old.md", "x");
        let upstream = MemTree::new("upstream");
        let p = plan(&upstream, &baseline, &baseline);
        assert_eq!(actions(&p), vec![("old.md", Action::Delete)]);
    }

    #[test]
    fn upstream_deletion_of_modified_file_conflicts() {
        let baseline = MemTree::new("baseline").with_file("old.md", "x");
        let upstream = MemTree::new("upstream");
        let local = MemTree::new("local").with_file("old.md", "x+mine");
        let p = plan(&upstream, &baseline, &local);
        assert_eq!(actions(&p), vec![("old.md", Action::Conflict)]);
        assert!(p.merge[0].reason.contains("upstream deleted"));
    }

    #[test]
    fn local_deletion_with_upstream_unchanged_is_respected() {
        let baseline = MemTree::new("baseline").with_file("hooks/a.sh", "x");
        let local = MemTree::new("local");
        let p = plan(&baseline, &baseline, &local);
        assert!(p.is_empty());
        assert_eq!(p.preserved[0].action, Action::KeepLocal);
        assert!(p.preserved[0].reason.contains("deletion"));
    }

    #[test]
    fn local_deletion_with_upstream_modified_conflicts() {
        let baseline = MemTree::new("baseline").with_file("hooks/a.sh", "x");
        let upstream = MemTree::new("upstream").with_file("hooks/a.sh", "y");
        let local = MemTree::new("local");
        let p = plan(&upstream, &baseline, &local);
        assert_eq!(actions(&p), vec![("hooks/a.sh", Action::Conflict)]);
    }

    #[test]
    fn both_deleted_is_noop() {
        let baseline = MemTree::new("baseline").with_file("gone.md", "x");
        let empty = MemTree::new("empty");
        let p = plan(&empty, &baseline, &empty);
        assert!(p.is_empty());
        assert!(p.preserved.is_empty());
    }

    #[test]
    fn added_in_both_with_different_content_conflicts() {
        let baseline = MemTree::new("baseline");
        let upstream = MemTree::new("upstream").with_file("new.md", "theirs");
        let local = MemTree::new("local").with_file("new.md", "ours");
        let p = plan(&upstream, &baseline, &local);
        assert_eq!(actions(&p), vec![("new.md", Action::Conflict)]);
    }

    #[test]
    fn merge_is_path_ordered() {
        let baseline = MemTree::new("baseline");
        let upstream = MemTree::new("upstream")
            .with_file("z.md", "z")
            .with_file("a/b.md", "b")
            .with_file("m.md", "m");
        let p = plan(&upstream, &baseline, &baseline);
        let paths: Vec<_> = p.merge.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["a/b.md", "m.md", "z.md"]);
    }

    #[test]
    fn plan_serializes_snake_case_actions() {
        let baseline = MemTree::new("baseline");
        let upstream = MemTree::new("upstream").with_file("new.md", "n");
        let json = serde_json::to_string(&plan(&upstream, &baseline, &baseline)).unwrap();
        assert!(json.contains("\"action\":\"take_upstream\""));
        assert!(json.contains("\"change_type\":\"added\""));
    }
}
