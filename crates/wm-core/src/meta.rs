use crate::error::{Result, WmError};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Highest `meta.json` schema this build understands.
pub const CURRENT_SCHEMA: u32 = 1;

/// Installed-version metadata, one JSON document per project (`.wm/meta.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub product: String,
    pub installed_version: String,
    pub installed_at: DateTime<Utc>,
    pub schema: u32,
}

impl Meta {
    pub fn new(product: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            installed_version: version.into(),
            installed_at: Utc::now().trunc_subsecs(0),
            schema: CURRENT_SCHEMA,
        }
    }

    /// Load `meta.json`. A missing file is [`WmError::NotInstalled`]; an
    /// unparsable one is [`WmError::CorruptMeta`].
    pub fn load(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WmError::NotInstalled)
            }
            Err(e) => return Err(WmError::io("read", path, e)),
        };
        serde_json::from_str(&data).map_err(|source| WmError::CorruptMeta {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`Meta::load`] but maps "not installed" to `None`.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        match Self::load(path) {
            Ok(meta) => Ok(Some(meta)),
            Err(WmError::NotInstalled) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Refuse to operate on metadata written by a newer build.
    pub fn check_schema(&self) -> Result<()> {
        if self.schema > CURRENT_SCHEMA {
            return Err(WmError::SchemaMismatch {
                found: self.schema,
                supported: CURRENT_SCHEMA,
            });
        }
        Ok(())
    }

    /// Record a successful sync to `version`.
    pub fn stamp(&mut self, version: &str) {
        self.installed_version = version.to_string();
        self.installed_at = Utc::now().trunc_subsecs(0);
    }
}
