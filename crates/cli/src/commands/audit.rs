//! Audit chain verification

use anyhow::{bail, Result};
use clap::Args;

use runledger_common::{AuditTrail, ChainVerification, RunLayout, RunledgerConfig};

use crate::output::{print_item, status_cell, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct VerifyAuditArgs {
    /// Run name
    pub run_name: String,
}

impl TableDisplay for ChainVerification {
    fn headers() -> Vec<&'static str> {
        vec!["Chain", "Events", "Head Digest", "First Invalid", "Reason"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            status_cell(self.valid),
            self.event_count.to_string(),
            self.head_digest.chars().take(16).collect(),
            self.first_invalid
                .map(|i| i.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.reason.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

pub fn execute(args: VerifyAuditArgs, config: &RunledgerConfig, format: OutputFormat) -> Result<()> {
    let layout = RunLayout::from_config(config, &args.run_name)?;
    let report = AuditTrail::verify(&layout)?;
    print_item(&report, format);

    if !report.valid {
        bail!(
            "audit chain for {} is broken at event {}",
            args.run_name,
            report.first_invalid.unwrap_or_default()
        );
    }
    Ok(())
}
