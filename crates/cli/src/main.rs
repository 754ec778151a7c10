//! runledger CLI - Main Entry Point
//!
//! Exit status: 0 on success, the test runner's own code when the
//! governance gate fails, 70 when the pipeline itself breaks.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use runledger_cli::commands::{audit, history, rank, run, serve, stages, tools};
use runledger_cli::output::{self, OutputFormat};
use runledger_cli::{exit_code_for, load_config};

/// runledger - evidence, governance and audit for browser test runs
#[derive(Parser)]
#[command(name = "runledger")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding runs/, history/ and reports/
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Config file (defaults to runledger.toml in the base directory)
    #[arg(long, env = "RUNLEDGER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the test runner, then the full pipeline
    Run(run::RunArgs),

    /// Check a run's artifacts exist and parse
    ValidateArtifacts(stages::RunNameArgs),

    /// Evaluate the governance gate
    Gate(stages::GateArgs),

    /// Append a finalize event to the audit trail
    FinalizeRun(stages::RunNameArgs),

    /// Append the run to the history index
    IndexRun(stages::RunNameArgs),

    /// Render the run report
    Report(stages::ReportArgs),

    /// Score selectors for robustness
    Rank(rank::RankArgs),

    /// Verify a run's audit chain
    VerifyAudit(audit::VerifyAuditArgs),

    /// Query the history index
    History(history::HistoryArgs),

    /// List or call pipeline tools
    #[command(subcommand)]
    Tools(tools::ToolsCommands),

    /// Serve tools as line-delimited JSON on stdin/stdout
    Serve,
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.base_dir.as_deref(), cli.config.as_deref())?;
    let format = cli.format;

    match cli.command {
        Commands::Run(args) => run::execute(args, &config, format).await,
        Commands::ValidateArtifacts(args) => stages::validate_artifacts(args, &config, format),
        Commands::Gate(args) => stages::gate(args, &config, format),
        Commands::FinalizeRun(args) => stages::finalize_run(args, &config, format),
        Commands::IndexRun(args) => stages::index_run(args, &config, format),
        Commands::Report(args) => stages::report(args, &config, format),
        Commands::Rank(args) => rank::execute(args, format),
        Commands::VerifyAudit(args) => audit::execute(args, &config, format),
        Commands::History(args) => history::execute(args, &config, format),
        Commands::Tools(cmd) => tools::execute(cmd, &config, format),
        Commands::Serve => serve::execute(&config).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(exit_code_for(&e));
    }
}
