use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CLAUDE_DIR: &str = ".claude";
pub const WM_DIR: &str = ".wm";
pub const BASELINE_DIR: &str = ".wm/baseline";
pub const BACKUPS_DIR: &str = ".wm/backups";

pub const META_FILE: &str = ".wm/meta.json";
pub const CONFIG_FILE: &str = ".wm/config.yaml";

/// Logical prefix under which the upstream bundle is embedded in the binary.
pub const UPSTREAM_PREFIX: &str = "system/";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn local_dir(root: &Path) -> PathBuf {
    root.join(CLAUDE_DIR)
}

pub fn baseline_dir(root: &Path) -> PathBuf {
    root.join(BASELINE_DIR)
}

pub fn backups_dir(root: &Path) -> PathBuf {
    root.join(BACKUPS_DIR)
}

pub fn meta_path(root: &Path) -> PathBuf {
    root.join(META_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Validate a tree-relative path: '/'-separated, non-empty, no `..`, no
/// absolute components.
pub fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}

/// Join a '/'-separated tree path onto an OS directory.
pub fn join_rel(dir: &Path, rel: &str) -> PathBuf {
    rel.split('/').fold(dir.to_path_buf(), |acc, seg| acc.join(seg))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
