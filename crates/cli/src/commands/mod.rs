//! CLI Commands

pub mod audit;
pub mod history;
pub mod rank;
pub mod run;
pub mod serve;
pub mod stages;
pub mod tools;

use runledger_common::{PipelineOutcome, GovernanceVerdict};

use crate::output::{status_cell, TableDisplay};

impl TableDisplay for PipelineOutcome {
    fn headers() -> Vec<&'static str> {
        vec!["Run", "Gate", "Exit", "Flaky", "Audit Events", "Head", "Report"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.run_name.clone(),
            status_cell(self.verdict.passed),
            self.verdict.exit_code.to_string(),
            self.verdict.is_flaky.to_string(),
            self.audit.event_count.to_string(),
            self.audit.head_digest.chars().take(12).collect(),
            self.report_path.display().to_string(),
        ]
    }
}

impl TableDisplay for GovernanceVerdict {
    fn headers() -> Vec<&'static str> {
        vec!["Gate", "Exit", "Flaky"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            status_cell(self.passed),
            self.exit_code.to_string(),
            self.is_flaky.to_string(),
        ]
    }
}
