//! Cross-run history index
//!
//! `history/run-index.jsonl` is an append-only trend log shared by every
//! run. It is not keyed: indexing the same run twice adds two lines, and
//! [`HistoryIndex::summarize`] is where per-run aggregation happens.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifact::ArtifactStore;
use crate::classification::FailureCategory;
use crate::layout::{RunLayout, HISTORY_INDEX_FILE};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub timestamp: String,
    pub run_name: String,
    pub category: FailureCategory,
    pub confidence: f64,
    pub is_flaky: bool,
}

/// Latest known state of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTrend {
    pub run_name: String,
    pub times_indexed: usize,
    pub latest: HistoryRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub total_records: usize,
    pub distinct_runs: usize,
    /// Share of distinct runs whose latest record is flaky
    pub flaky_rate: f64,
    pub by_category: BTreeMap<String, usize>,
    pub runs: Vec<RunTrend>,
}

pub struct HistoryIndex;

impl HistoryIndex {
    /// Append the run's current classification to the shared index
    pub fn append(layout: &RunLayout, run_name: &str) -> Result<HistoryRecord> {
        let record = match ArtifactStore::read_classification(layout) {
            Some(c) => HistoryRecord {
                timestamp: now(),
                run_name: run_name.to_string(),
                category: c.category,
                confidence: c.confidence,
                is_flaky: c.is_flaky,
            },
            None => HistoryRecord {
                timestamp: now(),
                run_name: run_name.to_string(),
                category: FailureCategory::Unknown,
                confidence: 0.0,
                is_flaky: false,
            },
        };

        std::fs::create_dir_all(&layout.history_dir)?;
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&layout.history_index_path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        info!(
            "Indexed run {} as {} (flaky={})",
            run_name, record.category, record.is_flaky
        );
        Ok(record)
    }

    /// Every record in append order. A malformed line is an error.
    pub fn load(layout: &RunLayout) -> Result<Vec<HistoryRecord>> {
        Self::load_from(&layout.history_index_path)
    }

    /// Like [`HistoryIndex::load`], reading an index file directly
    pub fn load_from(path: &Path) -> Result<Vec<HistoryRecord>> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        raw.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| Error::InvalidArtifactFormat {
                    name: HISTORY_INDEX_FILE.to_string(),
                    path: path.to_path_buf(),
                    reason: format!("line {}: {}", i + 1, e),
                })
            })
            .collect()
    }

    /// Aggregate records per run name; the last appended record wins
    pub fn summarize(records: &[HistoryRecord]) -> HistorySummary {
        let mut runs: BTreeMap<&str, RunTrend> = BTreeMap::new();
        for record in records {
            runs.entry(record.run_name.as_str())
                .and_modify(|trend| {
                    trend.times_indexed += 1;
                    trend.latest = record.clone();
                })
                .or_insert_with(|| RunTrend {
                    run_name: record.run_name.clone(),
                    times_indexed: 1,
                    latest: record.clone(),
                });
        }

        let mut by_category = BTreeMap::new();
        for trend in runs.values() {
            *by_category
                .entry(trend.latest.category.to_string())
                .or_insert(0) += 1;
        }

        let flaky = runs.values().filter(|t| t.latest.is_flaky).count();
        let flaky_rate = if runs.is_empty() {
            0.0
        } else {
            flaky as f64 / runs.len() as f64
        };

        HistorySummary {
            total_records: records.len(),
            distinct_runs: runs.len(),
            flaky_rate,
            by_category,
            runs: runs.into_values().collect(),
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
