//! Run the test runner, then the full pipeline

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use tokio::process::Command;
use tracing::{info, warn};

use runledger_common::{
    Pipeline, ReportFormat, RunledgerConfig, TestStyle, RUN_NAME_ENV, STYLE_ENV,
};

use crate::output::{print_item, OutputFormat};

use super::stages::ReportFormatArg;

#[derive(Args)]
pub struct RunArgs {
    /// Run name; generated from the current time when omitted
    #[arg(long, env = "RUNLEDGER_RUN_NAME")]
    pub run_name: Option<String>,

    /// Test-authoring style exported to the runner
    #[arg(long)]
    pub style: Option<String>,

    /// Skip spawning the runner and use this exit code instead
    #[arg(long)]
    pub exit_code: Option<i32>,

    /// Report format
    #[arg(long, value_enum, default_value = "markdown")]
    pub report_format: ReportFormatArg,

    /// Extra arguments passed to the runner after `--`
    #[arg(last = true)]
    pub runner_args: Vec<String>,
}

pub async fn execute(args: RunArgs, config: &RunledgerConfig, format: OutputFormat) -> Result<()> {
    let run_name = args
        .run_name
        .unwrap_or_else(|| format!("run-{}", Utc::now().format("%Y%m%d-%H%M%S")));

    let style_name = args.style.as_deref().unwrap_or(&config.runner.style);
    let style = TestStyle::parse(style_name)
        .with_context(|| format!("unknown test style {:?}", style_name))?;

    let exit_code = match args.exit_code {
        Some(code) => code,
        None => spawn_runner(config, &run_name, style, &args.runner_args).await?,
    };

    let pipeline = Pipeline::new(config.clone())
        .with_report_format(ReportFormat::from(args.report_format));
    let outcome = pipeline.run_stages(&run_name, exit_code)?;

    print_item(&outcome, format);
    outcome.verdict.into_result()?;
    Ok(())
}

/// Spawn the configured runner with inherited stdio and return its exit code
async fn spawn_runner(
    config: &RunledgerConfig,
    run_name: &str,
    style: TestStyle,
    extra: &[String],
) -> Result<i32> {
    let runner = &config.runner;
    info!(
        "Starting {} {} for run {}",
        runner.program,
        runner.args.join(" "),
        run_name
    );

    let status = Command::new(&runner.program)
        .args(&runner.args)
        .args(extra)
        .current_dir(&config.base_dir)
        .env(RUN_NAME_ENV, run_name)
        .env(STYLE_ENV, style.as_str())
        .status()
        .await
        .with_context(|| format!("failed to start test runner {:?}", runner.program))?;

    match status.code() {
        Some(code) => {
            info!("Test runner exited with {}", code);
            Ok(code)
        }
        None => {
            warn!("Test runner was terminated by a signal");
            Ok(1)
        }
    }
}
