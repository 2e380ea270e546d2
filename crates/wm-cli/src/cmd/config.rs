use crate::bundle::{self, Assets};
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use wm_core::bundle::EmbeddedTree;
use wm_core::diff::{Change, ChangeSummary};
use wm_core::plan::{Decision, Plan};
use wm_core::Engine;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Install the default configuration into .claude/
    Install,

    /// Show drift between the shipped defaults, the last sync, and .claude/
    Status,

    /// Merge the shipped defaults into .claude/, keeping local edits
    Update {
        /// Show the merge plan without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Skip the pre-update backup of .claude/
        #[arg(long)]
        no_backup: bool,
    },

    /// List backups of .claude/, newest first
    Backups,

    /// Restore .claude/ from a backup
    Restore {
        /// Backup file name, as shown by `config backups`
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Install => install(root, json),
        ConfigSubcommand::Status => status(root, json),
        ConfigSubcommand::Update { dry_run, no_backup } => update(root, dry_run, no_backup, json),
        ConfigSubcommand::Backups => backups(root, json),
        ConfigSubcommand::Restore { name } => restore(root, &name, json),
    }
}

fn engine(root: &Path) -> Engine<EmbeddedTree<Assets>> {
    Engine::new(bundle::upstream(), root).with_version(env!("CARGO_PKG_VERSION"))
}

// ---------------------------------------------------------------------------
// install
// ---------------------------------------------------------------------------

fn install(root: &Path, json: bool) -> anyhow::Result<()> {
    let report = engine(root)
        .install()
        .context("failed to install configuration")?;

    if json {
        return print_json(&report);
    }

    println!("Installed claude-wm v{} into {}", report.version, root.display());
    println!("  {} file(s) written to .claude/", report.written.len());
    if !report.kept.is_empty() {
        println!("\nKept existing local files that differ from the defaults:");
        for path in &report.kept {
            println!("  {path}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

fn status(root: &Path, json: bool) -> anyhow::Result<()> {
    let status = engine(root).status().context("failed to compute status")?;
    let state = status.sync_state();

    if json {
        let value = serde_json::json!({
            "state": state,
            "installed": status.installed,
            "upstream_version": status.upstream_version,
            "upstream_changes": status.upstream_changes,
            "upstream_summary": status.upstream_summary(),
            "local_changes": status.local_changes,
            "local_summary": status.local_summary(),
        });
        return print_json(&value);
    }

    match &status.installed {
        Some(meta) => println!(
            "Installed:  v{} ({})",
            meta.installed_version,
            meta.installed_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => {
            println!("Not installed. Run 'claude-wm config install'.");
            return Ok(());
        }
    }
    println!("Bundled:    v{}", status.upstream_version);
    println!("State:      {state}");

    print_changes(
        "Upstream changes since last sync",
        &status.upstream_changes,
        status.upstream_summary(),
    );
    print_changes(
        "Local changes since last sync",
        &status.local_changes,
        status.local_summary(),
    );
    Ok(())
}

fn print_changes(title: &str, changes: &[Change], summary: ChangeSummary) {
    if changes.is_empty() {
        return;
    }
    println!(
        "\n{title} ({} added, {} modified, {} deleted):",
        summary.added, summary.modified, summary.deleted
    );
    for c in changes {
        println!("  {} {}", c.change_type.symbol(), c.path);
    }
}

// ---------------------------------------------------------------------------
// update
// ---------------------------------------------------------------------------

fn update(root: &Path, dry_run: bool, no_backup: bool, json: bool) -> anyhow::Result<()> {
    let mut engine = engine(root);
    if no_backup {
        engine = engine.with_backups(false);
    }
    let plan = engine.plan().context("failed to plan update")?;

    if dry_run {
        if json {
            return print_json(&plan);
        }
        print_plan(&plan);
        return Ok(());
    }

    let report = engine.apply(&plan).context("failed to apply update")?;

    if json {
        let value = serde_json::json!({
            "plan": plan,
            "report": report,
        });
        return print_json(&value);
    }

    if plan.is_empty() && plan.upstream_changes.is_empty() {
        println!("Already up to date (v{}).", report.installed_version);
        print_preserved(&plan.preserved);
        return Ok(());
    }

    println!("Updated to v{}", report.installed_version);
    if let Some(backup) = &report.backup {
        println!("  backup: {}", backup.path.display());
    }
    for path in &report.written {
        println!("  updated  {path}");
    }
    for path in &report.retired {
        println!("  retired  {path} (no longer shipped; local copy kept)");
    }
    print_preserved(&plan.preserved);

    if report.has_conflicts() {
        println!(
            "\n{} conflict(s); local versions were kept:",
            report.conflicts.len()
        );
        for d in &report.conflicts {
            println!("  {}  ({})", d.path, d.reason);
        }
    }
    Ok(())
}

fn print_plan(plan: &Plan) {
    if plan.merge.is_empty() {
        println!("Nothing to update.");
    } else {
        let rows = plan
            .merge
            .iter()
            .map(|d| vec![d.path.clone(), d.action.to_string(), d.reason.clone()])
            .collect();
        print_table(&["PATH", "ACTION", "REASON"], rows);
        let s = &plan.summary;
        println!(
            "\n{} to take, {} to retire, {} conflict(s)",
            s.take_upstream, s.delete, s.conflict
        );
    }
    print_preserved(&plan.preserved);
}

fn print_preserved(preserved: &[Decision]) {
    if preserved.is_empty() {
        return;
    }
    println!("\nLocal edits kept as-is:");
    for d in preserved {
        println!("  {}  ({})", d.path, d.reason);
    }
}

// ---------------------------------------------------------------------------
// backups / restore
// ---------------------------------------------------------------------------

fn backups(root: &Path, json: bool) -> anyhow::Result<()> {
    let list = engine(root).backups().context("failed to list backups")?;

    if json {
        return print_json(&list);
    }
    if list.is_empty() {
        println!("No backups.");
        return Ok(());
    }

    let rows = list
        .iter()
        .map(|b| {
            vec![
                b.name.clone(),
                b.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                format_size(b.size),
            ]
        })
        .collect();
    print_table(&["NAME", "CREATED (UTC)", "SIZE"], rows);
    Ok(())
}

fn restore(root: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    let report = engine(root)
        .restore(name)
        .with_context(|| format!("failed to restore '{name}'"))?;

    if json {
        return print_json(&report);
    }
    println!(
        "Restored {} file(s) from {}",
        report.files, report.restored.name
    );
    println!("  previous state saved as {}", report.safety_backup.name);
    Ok(())
}

fn format_size(bytes: u64) -> String {
    match bytes {
        b if b >= 1024 * 1024 => format!("{:.1} MiB", b as f64 / (1024.0 * 1024.0)),
        b if b >= 1024 => format!("{:.1} KiB", b as f64 / 1024.0),
        b => format!("{b} B"),
    }
}
