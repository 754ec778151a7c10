//! Individual pipeline stages

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use serde::Serialize;

use runledger_common::{
    ArtifactStore, AuditFinal, AuditTrail, GovernanceGate, HistoryIndex, HistoryRecord,
    ReportBundler, ReportFormat, RunLayout, RunledgerConfig,
};

use crate::output::{print_item, print_success, OutputFormat, TableDisplay};

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum ReportFormatArg {
    #[default]
    Markdown,
    Json,
}

impl From<ReportFormatArg> for ReportFormat {
    fn from(arg: ReportFormatArg) -> Self {
        match arg {
            ReportFormatArg::Markdown => ReportFormat::Markdown,
            ReportFormatArg::Json => ReportFormat::Json,
        }
    }
}

#[derive(Args)]
pub struct RunNameArgs {
    /// Run name
    pub run_name: String,
}

#[derive(Args)]
pub struct GateArgs {
    /// Run name
    pub run_name: String,

    /// Exit code reported by the test runner
    #[arg(long, allow_hyphen_values = true)]
    pub exit_code: i32,
}

#[derive(Args)]
pub struct ReportArgs {
    /// Run name
    pub run_name: String,

    /// Output directory (defaults to the configured reports directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value = "markdown")]
    pub report_format: ReportFormatArg,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactsDisplay {
    run_name: String,
    valid: bool,
}

impl TableDisplay for ArtifactsDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Run", "Valid"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.run_name.clone(), self.valid.to_string()]
    }
}

impl TableDisplay for AuditFinal {
    fn headers() -> Vec<&'static str> {
        vec!["Run", "Finalized", "Events", "Head Digest"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.run_name.clone(),
            self.finalized_at.clone(),
            self.event_count.to_string(),
            self.head_digest.chars().take(16).collect(),
        ]
    }
}

impl TableDisplay for HistoryRecord {
    fn headers() -> Vec<&'static str> {
        vec!["Timestamp", "Run", "Category", "Confidence", "Flaky"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            self.run_name.clone(),
            self.category.to_string(),
            format!("{:.2}", self.confidence),
            self.is_flaky.to_string(),
        ]
    }
}

/// Check the run's artifacts without writing any
pub fn validate_artifacts(args: RunNameArgs, config: &RunledgerConfig, format: OutputFormat) -> Result<()> {
    let layout = RunLayout::from_config(config, &args.run_name)?;
    ArtifactStore::validate(&layout)?;

    print_item(
        &ArtifactsDisplay {
            run_name: args.run_name,
            valid: true,
        },
        format,
    );
    Ok(())
}

pub fn gate(args: GateArgs, config: &RunledgerConfig, format: OutputFormat) -> Result<()> {
    let layout = RunLayout::from_config(config, &args.run_name)?;
    let verdict = GovernanceGate::from_config(&config.governance).evaluate(&layout, args.exit_code);
    print_item(&verdict, format);
    verdict.into_result()?;
    Ok(())
}

pub fn finalize_run(args: RunNameArgs, config: &RunledgerConfig, format: OutputFormat) -> Result<()> {
    let layout = RunLayout::from_config(config, &args.run_name)?;
    let summary = AuditTrail::finalize(&layout, &args.run_name)?;
    print_item(&summary, format);
    Ok(())
}

pub fn index_run(args: RunNameArgs, config: &RunledgerConfig, format: OutputFormat) -> Result<()> {
    let layout = RunLayout::from_config(config, &args.run_name)?;
    let record = HistoryIndex::append(&layout, &args.run_name)?;
    print_item(&record, format);
    Ok(())
}

pub fn report(args: ReportArgs, config: &RunledgerConfig, format: OutputFormat) -> Result<()> {
    let layout = RunLayout::from_config(config, &args.run_name)?;
    let output_dir = args.output.unwrap_or_else(|| config.reports_path());
    let path = ReportBundler::render_as(
        &layout,
        &args.run_name,
        &output_dir,
        args.report_format.into(),
    )?;

    match format {
        OutputFormat::Table => print_success(&format!("Report written to {}", path.display())),
        _ => crate::output::print_value(&serde_json::json!({ "path": path }), format),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use runledger_common::Error;
    use tempfile::TempDir;

    fn config(tmp: &TempDir) -> RunledgerConfig {
        let mut config = RunledgerConfig::default();
        config.base_dir = tmp.path().to_path_buf();
        config
    }

    #[test]
    fn test_validate_artifacts_does_not_generate_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        let args = RunNameArgs {
            run_name: "empty".to_string(),
        };

        let err = validate_artifacts(args, &config, OutputFormat::Json).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MissingArtifact { .. })
        ));

        let layout = RunLayout::from_config(&config, "empty").unwrap();
        assert_eq!(std::fs::read_dir(&layout.artifacts_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_validate_artifacts_accepts_complete_run() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        let layout = RunLayout::from_config(&config, "done").unwrap();
        ArtifactStore::ensure_defaults(&layout).unwrap();

        let args = RunNameArgs {
            run_name: "done".to_string(),
        };
        validate_artifacts(args, &config, OutputFormat::Json).unwrap();
    }
}
