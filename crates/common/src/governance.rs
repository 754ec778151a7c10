//! Governance gate
//!
//! Converts the test runner's exit code and the persisted failure
//! classification into a CI verdict. The policy is a trait so stricter rules
//! can replace the default without touching the other stages.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::ArtifactStore;
use crate::classification::{FailureCategory, FailureClassification};
use crate::config::{GovernanceConfig, PolicyKind};
use crate::layout::RunLayout;
use crate::{Error, Result};

/// Outcome of a gate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceVerdict {
    pub exit_code: i32,
    pub is_flaky: bool,
    pub passed: bool,
}

impl GovernanceVerdict {
    /// Raise the verdict as an error when it failed
    pub fn into_result(self) -> Result<()> {
        if self.passed {
            Ok(())
        } else {
            Err(Error::GovernanceFailure {
                exit_code: self.exit_code,
                is_flaky: self.is_flaky,
            })
        }
    }
}

pub trait GovernancePolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `classification` is `None` when the run produced none
    fn evaluate(
        &self,
        exit_code: i32,
        classification: Option<&FailureClassification>,
    ) -> GovernanceVerdict;
}

/// A zero exit passes; a nonzero exit passes only when classified flaky.
/// Without a classification the gate fails closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlakyExemptPolicy;

impl GovernancePolicy for FlakyExemptPolicy {
    fn name(&self) -> &'static str {
        "flaky-exempt"
    }

    fn evaluate(
        &self,
        exit_code: i32,
        classification: Option<&FailureClassification>,
    ) -> GovernanceVerdict {
        let is_flaky = classification.map(|c| c.is_flaky).unwrap_or(false);
        GovernanceVerdict {
            exit_code,
            is_flaky,
            passed: exit_code == 0 || is_flaky,
        }
    }
}

/// Like [`FlakyExemptPolicy`] but a flaky classification only counts when
/// its confidence reaches `min_flaky_confidence`. Categories listed in
/// `exempt_categories` pass regardless.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceThresholdPolicy {
    pub min_flaky_confidence: f64,
    pub exempt_categories: Vec<FailureCategory>,
}

impl GovernancePolicy for ConfidenceThresholdPolicy {
    fn name(&self) -> &'static str {
        "confidence-threshold"
    }

    fn evaluate(
        &self,
        exit_code: i32,
        classification: Option<&FailureClassification>,
    ) -> GovernanceVerdict {
        let is_flaky = classification.map(|c| c.is_flaky).unwrap_or(false);
        let exempt = classification
            .map(|c| {
                (c.is_flaky && c.confidence >= self.min_flaky_confidence)
                    || self.exempt_categories.contains(&c.category)
            })
            .unwrap_or(false);

        GovernanceVerdict {
            exit_code,
            is_flaky,
            passed: exit_code == 0 || exempt,
        }
    }
}

/// The single policy point between raw exit status and CI outcome
pub struct GovernanceGate {
    policy: Box<dyn GovernancePolicy>,
}

impl Default for GovernanceGate {
    fn default() -> Self {
        Self::new(Box::new(FlakyExemptPolicy))
    }
}

impl GovernanceGate {
    pub fn new(policy: Box<dyn GovernancePolicy>) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &GovernanceConfig) -> Self {
        match config.policy {
            PolicyKind::FlakyExempt => Self::default(),
            PolicyKind::ConfidenceThreshold => Self::new(Box::new(ConfidenceThresholdPolicy {
                min_flaky_confidence: config.min_flaky_confidence,
                exempt_categories: config.exempt_categories.clone(),
            })),
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Evaluate against the classification on disk right now, without raising
    pub fn evaluate(&self, layout: &RunLayout, exit_code: i32) -> GovernanceVerdict {
        let classification = ArtifactStore::read_classification(layout);
        let verdict = self.policy.evaluate(exit_code, classification.as_ref());

        if verdict.passed {
            info!(
                policy = self.policy.name(),
                "Governance gate passed: exitCode={}, isFlaky={}",
                verdict.exit_code,
                verdict.is_flaky
            );
        } else {
            warn!(
                policy = self.policy.name(),
                "Governance gate failed: exitCode={}, isFlaky={}",
                verdict.exit_code,
                verdict.is_flaky
            );
        }
        verdict
    }

    /// Evaluate and raise [`Error::GovernanceFailure`] on a failed verdict
    pub fn decide(&self, layout: &RunLayout, exit_code: i32) -> Result<()> {
        self.evaluate(layout, exit_code).into_result()
    }
}
