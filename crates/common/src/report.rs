//! Report bundle rendering

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifact::{ArtifactStore, FAILURE_NARRATIVE, ROOT_CAUSE_SUMMARY};
use crate::layout::RunLayout;
use crate::Result;

pub const NO_NARRATIVE: &str = "No narrative.";
pub const EMPTY_RCA: &str = "{}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl ReportFormat {
    fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Json => "json",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    run_name: &'a str,
    narrative: &'a str,
    rca: serde_json::Value,
}

pub struct ReportBundler;

impl ReportBundler {
    /// Render the markdown report into `output_dir` (created if absent)
    pub fn render(layout: &RunLayout, run_name: &str, output_dir: &Path) -> Result<PathBuf> {
        Self::render_as(layout, run_name, output_dir, ReportFormat::Markdown)
    }

    /// Render in the requested format. Replaces any earlier report for the run.
    pub fn render_as(
        layout: &RunLayout,
        run_name: &str,
        output_dir: &Path,
        format: ReportFormat,
    ) -> Result<PathBuf> {
        let narrative = ArtifactStore::read_raw(layout, FAILURE_NARRATIVE)?
            .unwrap_or_else(|| NO_NARRATIVE.to_string());
        let rca = ArtifactStore::read_raw(layout, ROOT_CAUSE_SUMMARY)?
            .unwrap_or_else(|| EMPTY_RCA.to_string());

        let body = match format {
            ReportFormat::Markdown => markdown(run_name, &narrative, &rca),
            ReportFormat::Json => {
                // An RCA that is not valid JSON is embedded as a string
                let rca_value = serde_json::from_str(&rca)
                    .unwrap_or_else(|_| serde_json::Value::String(rca.trim().to_string()));
                serde_json::to_string_pretty(&JsonReport {
                    run_name,
                    narrative: narrative.trim(),
                    rca: rca_value,
                })?
            }
        };

        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(format!("report-{}.{}", run_name, format.extension()));
        std::fs::write(&path, body)?;

        info!("Report written to {}", path.display());
        Ok(path)
    }
}

fn markdown(run_name: &str, narrative: &str, rca: &str) -> String {
    [
        "# Run Report".to_string(),
        String::new(),
        format!("Run: **{}**", run_name),
        String::new(),
        "## Failure Narrative".to_string(),
        narrative.trim().to_string(),
        String::new(),
        "## RCA Summary".to_string(),
        "```json".to_string(),
        rca.trim().to_string(),
        "```".to_string(),
        String::new(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactStore;
    use tempfile::TempDir;

    #[test]
    fn test_render_without_artifacts_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let layout = RunLayout::resolve(tmp.path(), "empty").unwrap();

        let path = ReportBundler::render(&layout, "empty", &tmp.path().join("reports")).unwrap();
        assert_eq!(path, tmp.path().join("reports").join("report-empty.md"));

        let report = std::fs::read_to_string(&path).unwrap();
        assert!(report.contains("## Failure Narrative\nNo narrative.\n"));
        assert!(report.contains("## RCA Summary\n```json\n{}\n```"));
    }

    #[test]
    fn test_render_embeds_artifacts_verbatim() {
        let tmp = TempDir::new().unwrap();
        let layout = RunLayout::resolve(tmp.path(), "r").unwrap();
        ArtifactStore::ensure_defaults(&layout).unwrap();

        let path = ReportBundler::render(&layout, "r", tmp.path()).unwrap();
        let report = std::fs::read_to_string(path).unwrap();
        assert!(report.starts_with("# Run Report\n\nRun: **r**\n"));
        assert!(report.contains("No failures detected."));
        assert!(report.contains(r#""category": "none""#));
    }

    #[test]
    fn test_render_is_deterministic_and_replaces() {
        let tmp = TempDir::new().unwrap();
        let layout = RunLayout::resolve(tmp.path(), "r").unwrap();
        ArtifactStore::ensure_defaults(&layout).unwrap();

        let first = ReportBundler::render(&layout, "r", tmp.path()).unwrap();
        let first_body = std::fs::read_to_string(&first).unwrap();
        let second = ReportBundler::render(&layout, "r", tmp.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first_body, std::fs::read_to_string(&second).unwrap());

        ArtifactStore::write_narrative(&layout, "Checkout button moved.").unwrap();
        ReportBundler::render(&layout, "r", tmp.path()).unwrap();
        assert!(std::fs::read_to_string(&second).unwrap().contains("Checkout button moved."));
    }

    #[test]
    fn test_json_format() {
        let tmp = TempDir::new().unwrap();
        let layout = RunLayout::resolve(tmp.path(), "j").unwrap();
        ArtifactStore::ensure_defaults(&layout).unwrap();

        let path = ReportBundler::render_as(&layout, "j", tmp.path(), ReportFormat::Json).unwrap();
        assert_eq!(path.file_name().unwrap(), "report-j.json");

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["runName"], "j");
        assert_eq!(value["rca"]["category"], "none");
    }
}
