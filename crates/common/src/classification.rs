//! Failure classification
//!
//! A [`FailureClassifier`] turns the context collected around a failed test
//! (error text, network and console logs) into a [`FailureClassification`].
//! The classifier is a seam: [`RuleBasedClassifier`] is the deterministic
//! implementation shipped here, and a model-backed one can replace it
//! without touching the rest of the pipeline.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

/// Category of a test failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// No failure observed
    None,
    DomChanged,
    SelectorFailed,
    ApiError,
    Timeout,
    NavigationMismatch,
    UxRegression,
    UnexpectedModal,
    Environmental,
    TestLogicError,
    #[serde(other)]
    Unknown,
}

impl Default for FailureCategory {
    fn default() -> Self {
        Self::Unknown
    }
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::None => "none",
            FailureCategory::DomChanged => "dom_changed",
            FailureCategory::SelectorFailed => "selector_failed",
            FailureCategory::ApiError => "api_error",
            FailureCategory::Timeout => "timeout",
            FailureCategory::NavigationMismatch => "navigation_mismatch",
            FailureCategory::UxRegression => "ux_regression",
            FailureCategory::UnexpectedModal => "unexpected_modal",
            FailureCategory::Environmental => "environmental",
            FailureCategory::TestLogicError => "test_logic_error",
            FailureCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a failure. Persisted as `root-cause-summary.json`.
///
/// Every field has a serde default so partial summaries written by other
/// tools still load: a bare `{}` reads as unknown, zero confidence, not flaky.
/// An explicit `null` reads the same as an absent field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FailureClassification {
    #[serde(deserialize_with = "null_as_default")]
    pub category: FailureCategory,
    #[serde(deserialize_with = "null_as_default")]
    pub confidence: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub is_flaky: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub root_cause: String,
    #[serde(deserialize_with = "null_as_default")]
    pub suggested_actions: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_component: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl FailureClassification {
    pub fn new(category: FailureCategory, confidence: f64, is_flaky: bool) -> Self {
        Self {
            category,
            confidence: confidence.clamp(0.0, 1.0),
            is_flaky,
            ..Default::default()
        }
    }

    pub fn with_root_cause(mut self, root_cause: impl Into<String>) -> Self {
        self.root_cause = root_cause.into();
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggested_actions = actions.into_iter().map(Into::into).collect();
        self
    }
}

/// A network request observed during the failed test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkLog {
    pub url: String,
    pub method: String,
    pub status: u16,
    #[serde(default)]
    pub duration: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
    Info,
    Debug,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleLog {
    #[serde(rename = "type")]
    pub level: ConsoleLevel,
    pub message: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// Everything collected about one failed test
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FailureContext {
    pub test_name: String,
    pub test_file: String,
    pub error_message: String,
    pub error_stack: Option<String>,
    pub screenshot: Option<String>,
    pub html_snapshot: Option<String>,
    pub network_logs: Vec<NetworkLog>,
    pub console_logs: Vec<ConsoleLog>,
    pub timestamp: String,
    pub duration: u64,
    pub retry_count: u32,
}

/// Produces a classification from failure context. Must be a pure function
/// of its input.
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, ctx: &FailureContext) -> FailureClassification;
}

struct Rule {
    pattern: Regex,
    category: FailureCategory,
    confidence: f64,
    root_cause: &'static str,
}

// First match wins, so the more specific patterns come first.
static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    [
        (
            r"(?i)ECONNREFUSED|ECONNRESET|ENOTFOUND|EAI_AGAIN|net::ERR_|socket hang up|browser has been closed",
            FailureCategory::Environmental,
            0.8,
            "Test environment or network infrastructure was unavailable",
        ),
        (
            r"(?i)intercepts pointer events|(modal|dialog|overlay|popup).{0,40}(intercept|block|obscur)",
            FailureCategory::UnexpectedModal,
            0.75,
            "An unexpected modal or overlay blocked the interaction",
        ),
        (
            r"(?i)not attached to the dom|detached from (the )?dom|stale element",
            FailureCategory::DomChanged,
            0.75,
            "The element was re-rendered or removed while the test used it",
        ),
        (
            r"(?i)strict mode violation|resolved to 0 elements|no element (found|matches)|element not found|unable to find (element|locator)",
            FailureCategory::SelectorFailed,
            0.9,
            "Locator no longer matches the page structure",
        ),
        (
            r"(?i)timeout \d+ ?ms exceeded|timed out|timeout exceeded",
            FailureCategory::Timeout,
            0.8,
            "Operation did not complete within the configured timeout",
        ),
        (
            r"(?i)tohaveurl|expected (page )?url|navigation (to .* )?(failed|interrupted)",
            FailureCategory::NavigationMismatch,
            0.7,
            "Page navigated somewhere other than the test expected",
        ),
        (
            r"(?i)tohavescreenshot|screenshot comparison|pixels? (are )?differ",
            FailureCategory::UxRegression,
            0.7,
            "Rendered UI differs from the recorded baseline",
        ),
        (
            r"(?i)TypeError|ReferenceError|SyntaxError|is not a function|cannot read propert",
            FailureCategory::TestLogicError,
            0.6,
            "Test code raised a programming error",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, category, confidence, root_cause)| {
        Regex::new(pattern).ok().map(|pattern| Rule {
            pattern,
            category,
            confidence,
            root_cause,
        })
    })
    .collect()
});

/// Deterministic classifier driven by an ordered rule table.
///
/// Server-side errors (5xx responses) take precedence over the error text.
/// Environmental failures are always flaky; timeouts are flaky once the
/// runner has retried the test.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedClassifier;

impl RuleBasedClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl FailureClassifier for RuleBasedClassifier {
    fn classify(&self, ctx: &FailureContext) -> FailureClassification {
        if let Some(failed) = ctx.network_logs.iter().find(|log| log.status >= 500) {
            let mut classification = FailureClassification::new(FailureCategory::ApiError, 0.85, false)
                .with_root_cause(format!(
                    "{} {} returned HTTP {}",
                    failed.method, failed.url, failed.status
                ))
                .with_actions(suggested_actions(FailureCategory::ApiError).iter().copied());
            classification.reasoning = "A backend request failed with a server error".to_string();
            classification.affected_component = Some(failed.url.clone());
            return classification;
        }

        let haystack = match &ctx.error_stack {
            Some(stack) => format!("{}\n{}", ctx.error_message, stack),
            None => ctx.error_message.clone(),
        };

        let matched = RULES.iter().find(|rule| rule.pattern.is_match(&haystack));

        let mut classification = match matched {
            Some(rule) => {
                let is_flaky = match rule.category {
                    FailureCategory::Environmental => true,
                    FailureCategory::Timeout => ctx.retry_count > 0,
                    _ => false,
                };
                let mut c = FailureClassification::new(rule.category, rule.confidence, is_flaky)
                    .with_root_cause(rule.root_cause);
                c.reasoning = format!("Error message matched the {} rule", rule.category);
                c
            }
            None => {
                let console_errors = ctx
                    .console_logs
                    .iter()
                    .filter(|log| log.level == ConsoleLevel::Error)
                    .count();
                let mut c = FailureClassification::new(FailureCategory::Unknown, 0.3, false)
                    .with_root_cause("No known failure signature matched");
                c.reasoning = format!(
                    "No rule matched; {} console error(s) recorded",
                    console_errors
                );
                c
            }
        };

        classification.suggested_actions = suggested_actions(classification.category)
            .iter()
            .map(|s| s.to_string())
            .collect();

        debug!(
            test = %ctx.test_name,
            category = %classification.category,
            "Classified failure"
        );
        classification
    }
}

fn suggested_actions(category: FailureCategory) -> &'static [&'static str] {
    match category {
        FailureCategory::None => &[],
        FailureCategory::SelectorFailed | FailureCategory::DomChanged => &[
            "Run selector healing against the captured DOM snapshot",
            "Prefer data-testid or role locators in the page object",
        ],
        FailureCategory::ApiError => &[
            "Inspect the failing backend request",
            "Check service health for the affected endpoint",
        ],
        FailureCategory::Timeout => &[
            "Replace fixed waits with web-first assertions",
            "Check whether the environment was under load",
        ],
        FailureCategory::NavigationMismatch => &["Verify redirects and route guards for the flow"],
        FailureCategory::UxRegression => &[
            "Review the visual diff",
            "Update the baseline if the change is intended",
        ],
        FailureCategory::UnexpectedModal => &["Dismiss or stub the modal in test setup"],
        FailureCategory::Environmental => &[
            "Re-run the test",
            "Check test infrastructure availability",
        ],
        FailureCategory::TestLogicError => &["Fix the error in the test code"],
        FailureCategory::Unknown => &["Triage manually using the execution trace"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn ctx(message: &str) -> FailureContext {
        FailureContext {
            test_name: "login works".to_string(),
            error_message: message.to_string(),
            ..Default::default()
        }
    }

    #[test_case("locator.click: Error: strict mode violation: getByRole('button') resolved to 2 elements", FailureCategory::SelectorFailed ; "strict mode")]
    #[test_case("Timeout 30000ms exceeded.", FailureCategory::Timeout ; "timeout")]
    #[test_case("page.goto: net::ERR_CONNECTION_REFUSED at http://localhost:3000", FailureCategory::Environmental ; "connection refused")]
    #[test_case("<div class=\"modal-backdrop\"> intercepts pointer events", FailureCategory::UnexpectedModal ; "modal")]
    #[test_case("Element is not attached to the DOM", FailureCategory::DomChanged ; "detached")]
    #[test_case("expect(page).toHaveURL(expected) failed", FailureCategory::NavigationMismatch ; "url")]
    #[test_case("TypeError: Cannot read properties of undefined", FailureCategory::TestLogicError ; "type error")]
    #[test_case("something odd happened", FailureCategory::Unknown ; "fallback")]
    fn test_rule_categories(message: &str, expected: FailureCategory) {
        let c = RuleBasedClassifier::new().classify(&ctx(message));
        assert_eq!(c.category, expected);
        assert!((0.0..=1.0).contains(&c.confidence));
        assert!(!c.suggested_actions.is_empty());
    }

    #[test]
    fn test_server_error_wins_over_message() {
        let mut context = ctx("Timeout 5000ms exceeded.");
        context.network_logs.push(NetworkLog {
            url: "https://app.test/api/session".to_string(),
            method: "POST".to_string(),
            status: 503,
            duration: 12,
        });
        let c = RuleBasedClassifier::new().classify(&context);
        assert_eq!(c.category, FailureCategory::ApiError);
        assert_eq!(
            c.affected_component.as_deref(),
            Some("https://app.test/api/session")
        );
    }

    #[test]
    fn test_flakiness_rules() {
        let classifier = RuleBasedClassifier::new();
        assert!(classifier.classify(&ctx("socket hang up")).is_flaky);

        let mut timeout = ctx("Timeout 1000ms exceeded.");
        assert!(!classifier.classify(&timeout).is_flaky);
        timeout.retry_count = 1;
        assert!(classifier.classify(&timeout).is_flaky);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let context = ctx("Error: element not found");
        let a = RuleBasedClassifier::new().classify(&context);
        let b = RuleBasedClassifier::new().classify(&context);
        assert_eq!(a, b);
    }

    #[test]
    fn test_partial_summary_defaults() {
        let c: FailureClassification = serde_json::from_str("{}").unwrap();
        assert_eq!(c.category, FailureCategory::Unknown);
        assert_eq!(c.confidence, 0.0);
        assert!(!c.is_flaky);

        let c: FailureClassification =
            serde_json::from_str(r#"{"category":"brand_new","isFlaky":true}"#).unwrap();
        assert_eq!(c.category, FailureCategory::Unknown);
        assert!(c.is_flaky);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(FailureClassification::new(FailureCategory::Timeout, 1.7, false).confidence, 1.0);
        assert_eq!(FailureClassification::new(FailureCategory::Timeout, -0.2, false).confidence, 0.0);
    }
}
