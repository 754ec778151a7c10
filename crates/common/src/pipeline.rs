//! Post-run pipeline
//!
//! Runs the stages for one run name strictly in order:
//! layout, default artifacts, validation, governance, audit, history, report.
//! A failed governance verdict is raised only after the audit record, the
//! history line and the report have been written, so a failing run still
//! leaves complete evidence behind. Any other error aborts at the stage
//! that produced it.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, info_span};

use crate::artifact::ArtifactStore;
use crate::audit::{AuditFinal, AuditTrail, EVENT_GOVERNANCE};
use crate::config::RunledgerConfig;
use crate::governance::{GovernanceGate, GovernanceVerdict};
use crate::history::{HistoryIndex, HistoryRecord};
use crate::layout::RunLayout;
use crate::report::{ReportBundler, ReportFormat};
use crate::Result;

/// Everything the pipeline produced for one run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub run_name: String,
    pub layout: RunLayout,
    pub created_artifacts: Vec<String>,
    pub verdict: GovernanceVerdict,
    pub audit: AuditFinal,
    pub history: HistoryRecord,
    pub report_path: PathBuf,
}

pub struct Pipeline {
    config: RunledgerConfig,
    gate: GovernanceGate,
    report_format: ReportFormat,
}

impl Pipeline {
    pub fn new(config: RunledgerConfig) -> Self {
        let gate = GovernanceGate::from_config(&config.governance);
        Self {
            config,
            gate,
            report_format: ReportFormat::default(),
        }
    }

    pub fn with_gate(mut self, gate: GovernanceGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_report_format(mut self, format: ReportFormat) -> Self {
        self.report_format = format;
        self
    }

    pub fn config(&self) -> &RunledgerConfig {
        &self.config
    }

    /// Run every stage, then raise [`crate::Error::GovernanceFailure`] if the
    /// verdict failed
    pub fn execute(&self, run_name: &str, exit_code: i32) -> Result<PipelineOutcome> {
        let outcome = self.run_stages(run_name, exit_code)?;
        outcome.verdict.into_result()?;
        Ok(outcome)
    }

    /// Run every stage and return the outcome whatever the verdict
    pub fn run_stages(&self, run_name: &str, exit_code: i32) -> Result<PipelineOutcome> {
        let span = info_span!("pipeline", run = run_name);
        let _enter = span.enter();

        let layout = RunLayout::from_config(&self.config, run_name)?;

        let created = ArtifactStore::ensure_defaults(&layout)?;
        ArtifactStore::validate(&layout)?;

        let verdict = self.gate.evaluate(&layout, exit_code);
        AuditTrail::record(
            &layout,
            run_name,
            EVENT_GOVERNANCE,
            serde_json::json!({
                "policy": self.gate.policy_name(),
                "exitCode": verdict.exit_code,
                "isFlaky": verdict.is_flaky,
                "passed": verdict.passed,
            }),
        )?;
        let audit = AuditTrail::finalize(&layout, run_name)?;

        let history = HistoryIndex::append(&layout, run_name)?;

        let report_path = ReportBundler::render_as(
            &layout,
            run_name,
            &self.config.reports_path(),
            self.report_format,
        )?;

        info!(
            "Pipeline complete for {}: passed={}",
            run_name, verdict.passed
        );

        Ok(PipelineOutcome {
            run_name: run_name.to_string(),
            layout,
            created_artifacts: created.into_iter().map(String::from).collect(),
            verdict,
            audit,
            history,
            report_path,
        })
    }
}
