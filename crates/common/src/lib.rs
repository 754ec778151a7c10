//! runledger common library
//!
//! Post-processing for browser test runs: per-run evidence layout, artifact
//! generation and validation, the governance gate, a hash-chained audit
//! trail, the cross-run history index, report rendering, and selector
//! ranking and healing.

pub mod artifact;
pub mod audit;
pub mod classification;
pub mod config;
pub mod contract;
pub mod error;
pub mod governance;
pub mod healing;
pub mod history;
pub mod layout;
pub mod pipeline;
pub mod report;
pub mod selector;
pub mod tools;

// Re-export commonly used types
pub use artifact::ArtifactStore;
pub use audit::{AuditEvent, AuditFinal, AuditTrail, ChainVerification};
pub use classification::{
    FailureCategory, FailureClassification, FailureClassifier, FailureContext,
    RuleBasedClassifier,
};
pub use config::RunledgerConfig;
pub use contract::{ArchitectureReport, TestStyle};
pub use error::{Error, Result, PIPELINE_FAULT_EXIT_CODE};
pub use governance::{GovernanceGate, GovernancePolicy, GovernanceVerdict};
pub use healing::{HeuristicHealer, PageSnapshot, SelectorHealer, SelectorHealing};
pub use history::{HistoryIndex, HistoryRecord, HistorySummary};
pub use layout::RunLayout;
pub use pipeline::{Pipeline, PipelineOutcome};
pub use report::{ReportBundler, ReportFormat};
pub use selector::{SelectorCandidate, SelectorRankingEngine, SelectorTier};
pub use tools::{ToolContext, ToolRegistry};

/// runledger version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable carrying the run name into the test runner
pub const RUN_NAME_ENV: &str = "RUNLEDGER_RUN_NAME";

/// Environment variable carrying the test style into the test runner
pub const STYLE_ENV: &str = "RUNLEDGER_STYLE";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "RUNLEDGER_CONFIG";
