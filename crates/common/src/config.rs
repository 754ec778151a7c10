//! runledger configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classification::FailureCategory;
use crate::layout::HISTORY_INDEX_FILE;
use crate::Result;

/// File name looked up in the base directory when no explicit path is given
pub const CONFIG_FILE_NAME: &str = "runledger.toml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunledgerConfig {
    /// Directory holding `runs/`, `history/` and `reports/`
    pub base_dir: PathBuf,

    /// Per-run directories, relative to `base_dir`
    pub runs_dir: PathBuf,

    /// Shared history directory, relative to `base_dir`
    pub history_dir: PathBuf,

    /// Default report output directory, relative to `base_dir`
    pub reports_dir: PathBuf,

    /// External test runner
    pub runner: RunnerConfig,

    /// Governance policy selection
    pub governance: GovernanceConfig,

    /// Selector healing
    pub healing: HealingConfig,
}

impl Default for RunledgerConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            runs_dir: PathBuf::from("runs"),
            history_dir: PathBuf::from("history"),
            reports_dir: PathBuf::from("reports"),
            runner: RunnerConfig::default(),
            governance: GovernanceConfig::default(),
            healing: HealingConfig::default(),
        }
    }
}

/// External test runner invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Program to spawn
    pub program: String,

    /// Arguments passed before any user-supplied ones
    pub args: Vec<String>,

    /// Test-authoring style exported to the runner
    pub style: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: "npx".to_string(),
            args: vec!["playwright".to_string(), "test".to_string()],
            style: "native".to_string(),
        }
    }
}

/// Which governance policy the gate applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    FlakyExempt,
    ConfidenceThreshold,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GovernanceConfig {
    pub policy: PolicyKind,

    /// Minimum confidence for a flaky classification to exempt a failure.
    /// Only read by the confidence-threshold policy.
    pub min_flaky_confidence: f64,

    /// Categories that never fail the gate under the confidence-threshold policy
    pub exempt_categories: Vec<FailureCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    pub enabled: bool,

    /// Healings below this confidence are reported but not recorded
    pub confidence_threshold: f64,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.7,
        }
    }
}

impl RunledgerConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Load `runledger.toml` from a base directory, pinning `base_dir` to it
    pub fn load_from_base(base_dir: &Path) -> Result<Self> {
        let mut config = Self::load(&base_dir.join(CONFIG_FILE_NAME))?;
        config.base_dir = base_dir.to_path_buf();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default report directory resolved against the base directory
    pub fn reports_path(&self) -> PathBuf {
        self.base_dir.join(&self.reports_dir)
    }

    /// The shared history index file
    pub fn history_index_path(&self) -> PathBuf {
        self.base_dir.join(&self.history_dir).join(HISTORY_INDEX_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = RunledgerConfig::load_from_base(tmp.path()).unwrap();
        assert_eq!(config.base_dir, tmp.path());
        assert_eq!(config.runner.program, "npx");
        assert_eq!(config.governance.policy, PolicyKind::FlakyExempt);
        assert!(config.healing.enabled);
    }

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            r#"
reports_dir = "out"

[governance]
policy = "confidence-threshold"
min_flaky_confidence = 0.8
exempt_categories = ["environmental"]
"#,
        )
        .unwrap();

        let config = RunledgerConfig::load_from_base(tmp.path()).unwrap();
        assert_eq!(config.reports_path(), tmp.path().join("out"));
        assert_eq!(config.governance.policy, PolicyKind::ConfidenceThreshold);
        assert_eq!(config.governance.min_flaky_confidence, 0.8);
        assert_eq!(
            config.governance.exempt_categories,
            vec![FailureCategory::Environmental]
        );
        assert_eq!(config.runner.args, vec!["playwright", "test"]);
    }

    #[test]
    fn test_save_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join(CONFIG_FILE_NAME);
        let mut config = RunledgerConfig::default();
        config.runner.style = "bdd".to_string();
        config.save(&path).unwrap();

        let loaded = RunledgerConfig::load(&path).unwrap();
        assert_eq!(loaded.runner.style, "bdd");
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "policy = [").unwrap();
        let err = RunledgerConfig::load_from_base(tmp.path()).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
