//! Error types for runledger

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the runledger Error
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code reported when the pipeline itself breaks, as opposed to the
/// tests failing. Matches `EX_SOFTWARE` from sysexits.
pub const PIPELINE_FAULT_EXIT_CODE: i32 = 70;

/// runledger error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Missing required artifact {name}: {}", path.display())]
    MissingArtifact { name: String, path: PathBuf },

    #[error("Invalid artifact format in {name} ({}): {reason}", path.display())]
    InvalidArtifactFormat {
        name: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Governance gate failed: exitCode={exit_code}, isFlaky={is_flaky}")]
    GovernanceFailure { exit_code: i32, is_flaky: bool },

    #[error("Invalid run name {0:?}")]
    InvalidRunName(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid input for tool {tool}: {reason}")]
    InvalidToolInput { tool: String, reason: String },
}

impl Error {
    /// True for infrastructure faults; false for the governance outcome,
    /// which means the pipeline worked and the tests genuinely failed.
    pub fn is_pipeline_fault(&self) -> bool {
        !matches!(self, Error::GovernanceFailure { .. })
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::GovernanceFailure { exit_code, .. } if *exit_code != 0 => *exit_code,
            Error::GovernanceFailure { .. } => 1,
            _ => PIPELINE_FAULT_EXIT_CODE,
        }
    }
}
