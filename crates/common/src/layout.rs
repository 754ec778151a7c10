//! Canonical on-disk layout of a run
//!
//! ```text
//! <base>/
//!   runs/<run>/artifacts/     per-run evidence
//!   runs/<run>/audit/         events.ndjson + final.json
//!   history/run-index.jsonl   shared across runs
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RunledgerConfig;
use crate::{Error, Result};

pub const HISTORY_INDEX_FILE: &str = "run-index.jsonl";

/// Resolved directories for a single run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLayout {
    pub run_root: PathBuf,
    pub artifacts_dir: PathBuf,
    pub audit_dir: PathBuf,
    pub history_dir: PathBuf,
    pub history_index_path: PathBuf,
}

impl RunLayout {
    /// Resolve the layout under `base_dir` with the default directory names
    /// and make sure every directory exists.
    pub fn resolve(base_dir: impl AsRef<Path>, run_name: &str) -> Result<Self> {
        let base = base_dir.as_ref();
        Self::resolve_in(&base.join("runs"), &base.join("history"), run_name)
    }

    /// Resolve using the directory names from configuration
    pub fn from_config(config: &RunledgerConfig, run_name: &str) -> Result<Self> {
        Self::resolve_in(
            &config.base_dir.join(&config.runs_dir),
            &config.base_dir.join(&config.history_dir),
            run_name,
        )
    }

    fn resolve_in(runs_dir: &Path, history_dir: &Path, run_name: &str) -> Result<Self> {
        validate_run_name(run_name)?;

        let run_root = runs_dir.join(run_name);
        let layout = Self {
            artifacts_dir: run_root.join("artifacts"),
            audit_dir: run_root.join("audit"),
            history_index_path: history_dir.join(HISTORY_INDEX_FILE),
            history_dir: history_dir.to_path_buf(),
            run_root,
        };
        layout.ensure()?;
        Ok(layout)
    }

    fn ensure(&self) -> Result<()> {
        for dir in [
            &self.run_root,
            &self.artifacts_dir,
            &self.audit_dir,
            &self.history_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        debug!("Run layout ready at {}", self.run_root.display());
        Ok(())
    }

    /// Path of an artifact inside this run
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.artifacts_dir.join(file_name)
    }
}

/// Run names are used verbatim as a path segment, so anything that could
/// escape `runs/` is rejected.
pub fn validate_run_name(run_name: &str) -> Result<()> {
    let bad = run_name.is_empty()
        || run_name == "."
        || run_name == ".."
        || run_name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control());

    if bad {
        return Err(Error::InvalidRunName(run_name.to_string()));
    }
    Ok(())
}
