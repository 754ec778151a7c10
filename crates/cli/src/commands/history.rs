//! History queries

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use runledger_common::history::RunTrend;
use runledger_common::{HistoryIndex, HistoryRecord, RunledgerConfig};

use crate::output::{print_item, print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct HistoryArgs {
    /// Only show records for this run
    #[arg(long)]
    pub run: Option<String>,

    /// Show per-run aggregates instead of raw records
    #[arg(long)]
    pub summary: bool,

    /// Show at most this many of the most recent records
    #[arg(long)]
    pub limit: Option<usize>,
}

impl TableDisplay for RunTrend {
    fn headers() -> Vec<&'static str> {
        vec!["Run", "Indexed", "Latest Category", "Confidence", "Flaky", "Last Seen"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.run_name.clone(),
            self.times_indexed.to_string(),
            self.latest.category.to_string(),
            format!("{:.2}", self.latest.confidence),
            self.latest.is_flaky.to_string(),
            self.latest.timestamp.clone(),
        ]
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TotalsDisplay {
    total_records: usize,
    distinct_runs: usize,
    flaky_rate: f64,
}

impl TableDisplay for TotalsDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Records", "Runs", "Flaky Rate"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.total_records.to_string(),
            self.distinct_runs.to_string(),
            format!("{:.1}%", self.flaky_rate * 100.0),
        ]
    }
}

pub fn execute(args: HistoryArgs, config: &RunledgerConfig, format: OutputFormat) -> Result<()> {
    let mut records: Vec<HistoryRecord> = HistoryIndex::load_from(&config.history_index_path())?;
    if let Some(run) = &args.run {
        records.retain(|r| &r.run_name == run);
    }
    if let Some(limit) = args.limit {
        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
    }

    if !args.summary {
        print_list(&records, format);
        return Ok(());
    }

    let summary = HistoryIndex::summarize(&records);
    match format {
        OutputFormat::Table | OutputFormat::Plain => {
            print_item(
                &TotalsDisplay {
                    total_records: summary.total_records,
                    distinct_runs: summary.distinct_runs,
                    flaky_rate: summary.flaky_rate,
                },
                format,
            );
            print_list(&summary.runs, format);
        }
        _ => crate::output::print_value(&serde_json::to_value(&summary)?, format),
    }
    Ok(())
}
