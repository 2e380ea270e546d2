//! End-to-end sync behaviour over a real project directory with synthetic
//! upstream releases.

use tempfile::TempDir;
use wm_core::diff::{diff_trees, index_tree, ChangeType};
use wm_core::plan::Action;
use wm_core::tree::{MemTree, TreeSource};
use wm_core::Engine;

fn release(files: &[(&str, &str)]) -> MemTree {
    files
        .iter()
        .fold(MemTree::new("upstream"), |t, (path, data)| t.with_file(path, data))
}

fn engine(dir: &TempDir, upstream: MemTree, version: &str) -> Engine<MemTree> {
    Engine::new(upstream, dir.path()).with_version(version)
}

fn backup_count(e: &Engine<MemTree>) -> usize {
    e.backups().unwrap().len()
}

fn v1() -> MemTree {
    release(&[
        ("README.md", "A"),
        ("commands/plan.md", "plan v1"),
        ("hooks/guard.sh", "#!/bin/sh\nexit 0\n"),
    ])
}

#[test]
fn install_converges_baseline_with_upstream() {
    let dir = TempDir::new().unwrap();
    let e = engine(&dir, v1(), "1.0.0");
    e.install().unwrap();

    assert!(diff_trees(e.upstream(), &e.baseline()).unwrap().is_empty());
    assert!(diff_trees(&e.baseline(), &e.local()).unwrap().is_empty());
}

#[test]
fn update_with_no_changes_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let e = engine(&dir, v1(), "1.0.0");
    e.install().unwrap();

    let plan = e.plan().unwrap();
    assert!(plan.merge.is_empty());
    let before = index_tree(&e.local()).unwrap();
    let report = e.apply(&plan).unwrap();

    assert!(report.backup.is_none());
    assert!(report.written.is_empty());
    assert_eq!(index_tree(&e.local()).unwrap(), before);
    assert_eq!(backup_count(&e), 0);
}

#[test]
fn install_drift_update_scenario() {
    let dir = TempDir::new().unwrap();
    let first = engine(&dir, release(&[("README.md", "A")]), "1.0.0");
    first.install().unwrap();
    assert_eq!(first.local().read("README.md").unwrap(), b"A");
    assert_eq!(first.baseline().read("README.md").unwrap(), b"A");

    first.local().write("README.md", b"A+local", false).unwrap();
    let status = first.status().unwrap();
    assert!(status.upstream_changes.is_empty());
    assert_eq!(status.local_changes.len(), 1);
    assert_eq!(status.local_changes[0].path, "README.md");
    assert_eq!(status.local_changes[0].change_type, ChangeType::Modified);

    let second = engine(&dir, release(&[("README.md", "B")]), "2.0.0");
    let plan = second.plan().unwrap();
    assert_eq!(plan.merge.len(), 1);
    assert_eq!(plan.merge[0].action, Action::Conflict);

    let report = second.apply(&plan).unwrap();
    assert_eq!(second.local().read("README.md").unwrap(), b"A+local");
    assert_eq!(second.baseline().read("README.md").unwrap(), b"B");
    let conflicts: Vec<_> = report.conflicts.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(conflicts, vec!["README.md"]);
    assert_eq!(report.installed_version, "2.0.0");
}

#[test]
fn pure_adoption_of_new_upstream_file() {
    let dir = TempDir::new().unwrap();
    engine(&dir, v1(), "1.0.0").install().unwrap();

    let next = engine(&dir, v1().with_file("commands/new.md", "fresh"), "1.1.0");
    let plan = next.plan().unwrap();
    assert_eq!(plan.merge.len(), 1);
    assert_eq!(plan.merge[0].path, "commands/new.md");
    assert_eq!(plan.merge[0].action, Action::TakeUpstream);

    next.apply(&plan).unwrap();
    assert_eq!(next.local().read("commands/new.md").unwrap(), b"fresh");
    assert_eq!(
        next.local().read("commands/new.md").unwrap(),
        next.baseline().read("commands/new.md").unwrap()
    );
}

#[test]
fn local_only_file_survives_update() {
    let dir = TempDir::new().unwrap();
    let first = engine(&dir, v1(), "1.0.0");
    first.install().unwrap();
    first.local().write("notes.txt", b"mine", false).unwrap();

    let next = engine(&dir, release(&[("README.md", "B")]), "2.0.0");
    next.update().unwrap();

    assert_eq!(next.local().read("notes.txt").unwrap(), b"mine");
    let drift = diff_trees(&next.baseline(), &next.local()).unwrap();
    let notes = drift.iter().find(|c| c.path == "notes.txt").unwrap();
    assert_eq!(notes.change_type, ChangeType::Added);
}

#[test]
fn second_update_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let first = engine(&dir, v1(), "1.0.0");
    first.install().unwrap();
    first.local().write("commands/plan.md", b"my plan", false).unwrap();
    first.local().write("notes.txt", b"mine", false).unwrap();

    let next = engine(
        &dir,
        release(&[
            ("README.md", "B"),
            ("commands/plan.md", "plan v2"),
            ("commands/new.md", "new"),
        ]),
        "2.0.0",
    );
    next.update().unwrap();
    let local_after_first = index_tree(&next.local()).unwrap();
    let baseline_after_first = index_tree(&next.baseline()).unwrap();
    let backups_after_first = backup_count(&next);

    let (plan, report) = next.update().unwrap();
    assert!(plan.merge.is_empty());
    assert!(!plan.preserved.is_empty());
    assert!(report.backup.is_none());
    assert_eq!(index_tree(&next.local()).unwrap(), local_after_first);
    assert_eq!(index_tree(&next.baseline()).unwrap(), baseline_after_first);
    assert_eq!(backup_count(&next), backups_after_first);
}

#[test]
fn retired_upstream_file_stays_local_but_leaves_baseline() {
    let dir = TempDir::new().unwrap();
    engine(&dir, v1(), "1.0.0").install().unwrap();

    let next = engine(
        &dir,
        release(&[("README.md", "A"), ("commands/plan.md", "plan v1")]),
        "1.1.0",
    );
    let (plan, report) = next.update().unwrap();
    assert_eq!(plan.merge[0].action, Action::Delete);
    assert_eq!(report.retired, vec!["hooks/guard.sh"]);
    assert!(next.local().read("hooks/guard.sh").is_ok());
    assert!(next.baseline().read("hooks/guard.sh").is_err());

    // Now user-owned: shows as local drift, never re-planned.
    let again = next.plan().unwrap();
    assert!(again.merge.is_empty());
    assert_eq!(again.preserved[0].path, "hooks/guard.sh");
}

#[test]
fn acknowledged_conflict_becomes_local_drift() {
    let dir = TempDir::new().unwrap();
    let first = engine(&dir, v1(), "1.0.0");
    first.install().unwrap();
    first.local().write("README.md", b"A+local", false).unwrap();

    let next = engine(&dir, v1().with_file("README.md", "B"), "2.0.0");
    let (_, report) = next.update().unwrap();
    assert!(report.has_conflicts());

    let status = next.status().unwrap();
    assert!(status.upstream_changes.is_empty());
    assert_eq!(status.local_changes[0].path, "README.md");
    assert!(next.plan().unwrap().merge.is_empty());
}

#[test]
fn update_snapshot_holds_pre_update_local() {
    let dir = TempDir::new().unwrap();
    let first = engine(&dir, v1(), "1.0.0");
    first.install().unwrap();

    let next = engine(&dir, v1().with_file("commands/plan.md", "plan v2"), "1.1.0");
    let (_, report) = next.update().unwrap();
    let backup = report.backup.unwrap();
    assert_eq!(next.local().read("commands/plan.md").unwrap(), b"plan v2");

    next.restore(&backup.name).unwrap();
    assert_eq!(next.local().read("commands/plan.md").unwrap(), b"plan v1");
}

#[test]
fn status_is_side_effect_free() {
    let dir = TempDir::new().unwrap();
    engine(&dir, v1(), "1.0.0").install().unwrap();
    let next = engine(&dir, v1().with_file("README.md", "B"), "2.0.0");

    let before = index_tree(&next.baseline()).unwrap();
    let status = next.status().unwrap();
    assert_eq!(status.upstream_changes.len(), 1);
    assert_eq!(index_tree(&next.baseline()).unwrap(), before);
    assert!(next.local().entries().unwrap().iter().any(|e| e.path == "README.md"));
}
