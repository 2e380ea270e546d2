use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WmError {
    #[error("not installed: run 'claude-wm config install'")]
    NotInstalled,

    #[error("configuration already installed (found {})", .0.display())]
    AlreadyInstalled(PathBuf),

    #[error("corrupt metadata in {}", path.display())]
    CorruptMeta {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("metadata schema {found} is newer than this build supports ({supported}); upgrade claude-wm")]
    SchemaMismatch { found: u32, supported: u32 },

    #[error("failed to {op} {}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("plan is stale for '{0}': re-run the update to compute a fresh plan")]
    StalePlan(String),

    #[error("backup not found: {0}")]
    BackupNotFound(String),

    #[error("invalid tree path '{0}'")]
    InvalidPath(String),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl WmError {
    /// Wrap an I/O error with the operation and path that produced it.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WmError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, WmError>;

/// Attach operation + path context to a raw `std::io::Result`.
pub(crate) trait IoContext<T> {
    fn io_ctx(self, op: &'static str, path: &std::path::Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_ctx(self, op: &'static str, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| WmError::io(op, path, e))
    }
}
