//! Run artifacts
//!
//! Four artifacts are required for every run:
//! - `healed-selectors.json` - healing records produced during the run
//! - `root-cause-summary.json` - the persisted [`FailureClassification`]
//! - `failure-narrative.md` - human-readable account of the failure
//! - `execution-trace-map.json` - step trace
//!
//! Defaults are written create-if-missing, so evidence produced by the real
//! test run is never overwritten by a later pipeline pass.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::classification::FailureClassification;
use crate::layout::RunLayout;
use crate::{Error, Result};

pub const HEALED_SELECTORS: &str = "healed-selectors.json";
pub const ROOT_CAUSE_SUMMARY: &str = "root-cause-summary.json";
pub const FAILURE_NARRATIVE: &str = "failure-narrative.md";
pub const EXECUTION_TRACE_MAP: &str = "execution-trace-map.json";

pub const DEFAULT_NARRATIVE: &str = "# Failure Narrative\n\nNo failures detected.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Must parse as JSON
    Json,
    /// Only checked for existence
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Requiredness {
    Required,
    Optional,
}

/// Static description of an artifact file
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ArtifactSpec {
    pub name: &'static str,
    pub kind: ArtifactKind,
    pub requiredness: Requiredness,
}

impl ArtifactSpec {
    fn default_content(&self) -> Result<String> {
        let value = match self.name {
            HEALED_SELECTORS => json!({ "selectors": [] }),
            ROOT_CAUSE_SUMMARY => json!({ "category": "none", "confidence": 1, "isFlaky": false }),
            EXECUTION_TRACE_MAP => json!({ "steps": [] }),
            _ => return Ok(DEFAULT_NARRATIVE.to_string()),
        };
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

pub const REQUIRED_ARTIFACTS: [ArtifactSpec; 4] = [
    ArtifactSpec {
        name: HEALED_SELECTORS,
        kind: ArtifactKind::Json,
        requiredness: Requiredness::Required,
    },
    ArtifactSpec {
        name: ROOT_CAUSE_SUMMARY,
        kind: ArtifactKind::Json,
        requiredness: Requiredness::Required,
    },
    ArtifactSpec {
        name: FAILURE_NARRATIVE,
        kind: ArtifactKind::Text,
        requiredness: Requiredness::Required,
    },
    ArtifactSpec {
        name: EXECUTION_TRACE_MAP,
        kind: ArtifactKind::Json,
        requiredness: Requiredness::Required,
    },
];

/// Reads, writes and validates the artifacts of a run
pub struct ArtifactStore;

impl ArtifactStore {
    /// Write a default for every required artifact that does not exist yet.
    /// Returns the names that were created.
    pub fn ensure_defaults(layout: &RunLayout) -> Result<Vec<&'static str>> {
        std::fs::create_dir_all(&layout.artifacts_dir)?;

        let mut created = Vec::new();
        for spec in REQUIRED_ARTIFACTS {
            let path = layout.artifact_path(spec.name);
            if write_if_absent(&path, &spec.default_content()?)? {
                debug!("Created default artifact {}", path.display());
                created.push(spec.name);
            }
        }

        if !created.is_empty() {
            info!("Generated {} default artifact(s)", created.len());
        }
        Ok(created)
    }

    /// Check every required artifact exists and every JSON artifact parses
    pub fn validate(layout: &RunLayout) -> Result<()> {
        for spec in REQUIRED_ARTIFACTS
            .iter()
            .filter(|s| s.requiredness == Requiredness::Required)
        {
            let path = layout.artifact_path(spec.name);
            if !path.is_file() {
                return Err(Error::MissingArtifact {
                    name: spec.name.to_string(),
                    path,
                });
            }
        }

        for spec in REQUIRED_ARTIFACTS
            .iter()
            .filter(|s| s.kind == ArtifactKind::Json)
        {
            let path = layout.artifact_path(spec.name);
            let raw = std::fs::read_to_string(&path)?;
            if let Err(e) = serde_json::from_str::<serde_json::Value>(&raw) {
                return Err(Error::InvalidArtifactFormat {
                    name: spec.name.to_string(),
                    path,
                    reason: e.to_string(),
                });
            }
        }

        debug!("Artifacts valid for {}", layout.run_root.display());
        Ok(())
    }

    /// The persisted classification, or `None` when absent or unreadable
    pub fn read_classification(layout: &RunLayout) -> Option<FailureClassification> {
        let path = layout.artifact_path(ROOT_CAUSE_SUMMARY);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(classification) => Some(classification),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Replace the root-cause summary with a classifier's output
    pub fn write_classification(
        layout: &RunLayout,
        classification: &FailureClassification,
    ) -> Result<()> {
        let path = layout.artifact_path(ROOT_CAUSE_SUMMARY);
        std::fs::write(&path, serde_json::to_string_pretty(classification)?)?;
        info!(
            "Recorded classification {} (confidence {:.2})",
            classification.category, classification.confidence
        );
        Ok(())
    }

    /// Raw text of an artifact, `None` when it does not exist
    pub fn read_raw(layout: &RunLayout, name: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(layout.artifact_path(name)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_narrative(layout: &RunLayout, narrative: &str) -> Result<()> {
        std::fs::write(layout.artifact_path(FAILURE_NARRATIVE), narrative)?;
        Ok(())
    }

    /// Append one record to the `selectors` array of the healed-selector
    /// artifact, creating the artifact if needed.
    pub fn append_healing<T: Serialize>(layout: &RunLayout, record: &T) -> Result<usize> {
        let path = layout.artifact_path(HEALED_SELECTORS);
        let mut doc = match Self::read_raw(layout, HEALED_SELECTORS)? {
            Some(raw) => serde_json::from_str::<serde_json::Value>(&raw).map_err(|e| {
                Error::InvalidArtifactFormat {
                    name: HEALED_SELECTORS.to_string(),
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?,
            None => json!({ "selectors": [] }),
        };

        let selectors = match doc.get_mut("selectors").and_then(|s| s.as_array_mut()) {
            Some(selectors) => selectors,
            None => {
                return Err(Error::InvalidArtifactFormat {
                    name: HEALED_SELECTORS.to_string(),
                    path,
                    reason: "missing `selectors` array".to_string(),
                })
            }
        };
        selectors.push(serde_json::to_value(record)?);
        let count = selectors.len();

        std::fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
        Ok(count)
    }
}

/// Create `path` with `content` unless it already exists. Uses `create_new`
/// so an existing file is never truncated.
fn write_if_absent(path: &Path, content: &str) -> Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(content.as_bytes())?;
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::FailureCategory;
    use tempfile::TempDir;

    fn layout(tmp: &TempDir) -> RunLayout {
        RunLayout::resolve(tmp.path(), "run-1").unwrap()
    }

    #[test]
    fn test_ensure_defaults_creates_all_required() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);

        let created = ArtifactStore::ensure_defaults(&layout).unwrap();
        assert_eq!(created.len(), 4);
        for spec in REQUIRED_ARTIFACTS {
            assert!(layout.artifact_path(spec.name).is_file(), "{}", spec.name);
        }

        let rca: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(layout.artifact_path(ROOT_CAUSE_SUMMARY)).unwrap())
                .unwrap();
        assert_eq!(rca, json!({ "category": "none", "confidence": 1, "isFlaky": false }));
        assert_eq!(
            std::fs::read_to_string(layout.artifact_path(FAILURE_NARRATIVE)).unwrap(),
            DEFAULT_NARRATIVE
        );
    }

    #[test]
    fn test_ensure_defaults_never_overwrites() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let narrative = "# Failure Narrative\n\nLogin button vanished.\n";
        std::fs::write(layout.artifact_path(FAILURE_NARRATIVE), narrative).unwrap();

        let created = ArtifactStore::ensure_defaults(&layout).unwrap();
        assert!(!created.contains(&FAILURE_NARRATIVE));

        let again = ArtifactStore::ensure_defaults(&layout).unwrap();
        assert!(again.is_empty());
        assert_eq!(
            std::fs::read_to_string(layout.artifact_path(FAILURE_NARRATIVE)).unwrap(),
            narrative
        );
    }

    #[test]
    fn test_validate_passes_after_defaults() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        ArtifactStore::ensure_defaults(&layout).unwrap();
        ArtifactStore::validate(&layout).unwrap();
    }

    #[test]
    fn test_validate_reports_missing_file() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        ArtifactStore::ensure_defaults(&layout).unwrap();
        std::fs::remove_file(layout.artifact_path(EXECUTION_TRACE_MAP)).unwrap();

        match ArtifactStore::validate(&layout).unwrap_err() {
            Error::MissingArtifact { name, .. } => assert_eq!(name, EXECUTION_TRACE_MAP),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_reports_malformed_json() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        std::fs::write(layout.artifact_path(HEALED_SELECTORS), "{ not json").unwrap();
        ArtifactStore::ensure_defaults(&layout).unwrap();

        match ArtifactStore::validate(&layout).unwrap_err() {
            Error::InvalidArtifactFormat { name, .. } => assert_eq!(name, HEALED_SELECTORS),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_narrative_is_not_structurally_checked() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        std::fs::write(layout.artifact_path(FAILURE_NARRATIVE), "{ definitely not json").unwrap();
        ArtifactStore::ensure_defaults(&layout).unwrap();
        ArtifactStore::validate(&layout).unwrap();
    }

    #[test]
    fn test_classification_round_trip_and_fallbacks() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        assert!(ArtifactStore::read_classification(&layout).is_none());

        std::fs::write(layout.artifact_path(ROOT_CAUSE_SUMMARY), "garbage").unwrap();
        assert!(ArtifactStore::read_classification(&layout).is_none());

        let classification = FailureClassification::new(FailureCategory::Timeout, 0.8, true)
            .with_root_cause("slow backend");
        ArtifactStore::write_classification(&layout, &classification).unwrap();
        assert_eq!(
            ArtifactStore::read_classification(&layout),
            Some(classification)
        );
    }

    #[test]
    fn test_append_healing_grows_selector_list() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        ArtifactStore::ensure_defaults(&layout).unwrap();

        let first = ArtifactStore::append_healing(&layout, &json!({ "originalSelector": "#a" })).unwrap();
        let second = ArtifactStore::append_healing(&layout, &json!({ "originalSelector": "#b" })).unwrap();
        assert_eq!((first, second), (1, 2));
        ArtifactStore::validate(&layout).unwrap();
    }
}
