//! Test-authoring styles and their architecture contracts
//!
//! Three styles are supported: plain specs (`native`), behavior-driven step
//! definitions (`bdd`), and step definitions over page objects (`pom-bdd`).
//! [`validate_files`] checks test sources against the rules of a style.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::selector::{SelectorRankingEngine, SelectorTier};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestStyle {
    Native,
    Bdd,
    PomBdd,
}

impl TestStyle {
    pub const ALL: [TestStyle; 3] = [TestStyle::Native, TestStyle::Bdd, TestStyle::PomBdd];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStyle::Native => "native",
            TestStyle::Bdd => "bdd",
            TestStyle::PomBdd => "pom-bdd",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    pub fn descriptor(&self) -> StyleDescriptor {
        let (description, features): (&str, &[&str]) = match self {
            TestStyle::Native => (
                "Plain spec files driven directly by the test runner",
                &["spec files", "fixtures", "web-first assertions"],
            ),
            TestStyle::Bdd => (
                "Gherkin features with step definitions",
                &["feature files", "step definitions", "world object"],
            ),
            TestStyle::PomBdd => (
                "Gherkin features whose steps delegate to page objects",
                &["feature files", "step definitions", "page objects"],
            ),
        };
        StyleDescriptor {
            name: *self,
            description: description.to_string(),
            features: features.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl std::fmt::Display for TestStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleDescriptor {
    pub name: TestStyle,
    pub description: String,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractViolation {
    pub rule_id: String,
    pub file: String,
    pub line: Option<usize>,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchitectureReport {
    pub style: TestStyle,
    pub files_checked: usize,
    pub violations: Vec<ContractViolation>,
    pub passed: bool,
}

static PLAYWRIGHT_TEST_IMPORT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"import\s*\{[^}]*\btest\b[^}]*\}\s*from\s*['"]@playwright/test['"]"#).ok()
});

static RAW_PAGE_CALL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\bpage\.(locator|click|fill|type|check|hover)\(").ok());

static SELECTOR_LITERAL: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"\.(?:locator|click|fill|hover|check|waitForSelector)\(\s*(?:'([^']+)'|"([^"]+)")"#)
        .ok()
});

/// Expand directories and check every test source against the style rules
pub fn validate_files(style: TestStyle, paths: &[PathBuf]) -> Result<ArchitectureReport> {
    let mut violations = Vec::new();
    let mut files_checked = 0;

    for path in paths {
        if !path.exists() {
            violations.push(violation(path, None, "file-missing", "File does not exist", Severity::Error));
            continue;
        }

        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() || !is_test_source(entry.path()) {
                continue;
            }

            let content = std::fs::read_to_string(entry.path())?;
            files_checked += 1;
            check_file(style, entry.path(), &content, &mut violations);
        }
    }

    let passed = !violations.iter().any(|v| v.severity == Severity::Error);
    debug!(
        "Checked {} file(s) against {} contract: {} violation(s)",
        files_checked,
        style,
        violations.len()
    );

    Ok(ArchitectureReport {
        style,
        files_checked,
        violations,
        passed,
    })
}

fn is_test_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ts" | "js" | "feature")
    )
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

fn is_feature(path: &Path) -> bool {
    file_name(path).ends_with(".feature")
}

fn is_step_file(path: &Path) -> bool {
    let name = file_name(path);
    name.ends_with(".steps.ts")
        || name.ends_with(".steps.js")
        || path.components().any(|c| c.as_os_str() == "step_definitions")
}

fn is_page_object(path: &Path) -> bool {
    file_name(path).ends_with("Page.ts") || path.components().any(|c| c.as_os_str() == "pages")
}

fn is_support_file(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == "support")
}

fn check_file(style: TestStyle, path: &Path, content: &str, out: &mut Vec<ContractViolation>) {
    let name = file_name(path);

    match style {
        TestStyle::Native => {
            let is_spec = [".spec.ts", ".test.ts", ".spec.js", ".test.js"]
                .iter()
                .any(|suffix| name.ends_with(suffix));
            if !is_spec {
                out.push(violation(
                    path,
                    None,
                    "native-spec-suffix",
                    "Native tests must be named *.spec.ts or *.test.ts",
                    Severity::Error,
                ));
            }
            if content.contains("@cucumber/cucumber") {
                out.push(violation(
                    path,
                    None,
                    "native-no-cucumber",
                    "Native specs must not use step definitions",
                    Severity::Error,
                ));
            }
        }
        TestStyle::Bdd | TestStyle::PomBdd => {
            let allowed = is_feature(path)
                || is_step_file(path)
                || is_support_file(path)
                || (style == TestStyle::PomBdd && is_page_object(path));
            if !allowed {
                out.push(violation(
                    path,
                    None,
                    "bdd-file-kind",
                    "Only features, step definitions and support files belong in a BDD suite",
                    Severity::Error,
                ));
            }
            if is_step_file(path) {
                if let Some(re) = PLAYWRIGHT_TEST_IMPORT.as_ref() {
                    if let Some(line) = find_line(content, re) {
                        out.push(violation(
                            path,
                            Some(line),
                            "bdd-no-test-runner",
                            "Step definitions must not declare runner tests",
                            Severity::Error,
                        ));
                    }
                }
            }
            if style == TestStyle::PomBdd && is_step_file(path) {
                if let Some(re) = RAW_PAGE_CALL.as_ref() {
                    for (i, line) in content.lines().enumerate() {
                        if re.is_match(line) {
                            out.push(violation(
                                path,
                                Some(i + 1),
                                "pom-no-raw-locators",
                                "Step definitions must go through page objects, not raw page calls",
                                Severity::Error,
                            ));
                        }
                    }
                }
            }
        }
    }

    if content.contains("waitForTimeout(") {
        out.push(violation(
            path,
            find_line_literal(content, "waitForTimeout("),
            "no-fixed-waits",
            "Fixed sleeps make tests flaky; wait on a condition instead",
            Severity::Warning,
        ));
    }

    check_selectors(path, content, out);
}

/// Flag selector literals the ranking engine rates poor
fn check_selectors(path: &Path, content: &str, out: &mut Vec<ContractViolation>) {
    let Some(re) = SELECTOR_LITERAL.as_ref() else {
        return;
    };
    let engine = SelectorRankingEngine::new();

    for (i, line) in content.lines().enumerate() {
        for caps in re.captures_iter(line) {
            let Some(selector) = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) else {
                continue;
            };
            let ranked = engine.score(selector);
            if ranked.tier == SelectorTier::Poor {
                out.push(violation(
                    path,
                    Some(i + 1),
                    "fragile-selector",
                    &format!("Selector {:?} scores {:.1} ({})", selector, ranked.score, ranked.tier),
                    Severity::Warning,
                ));
            }
        }
    }
}

fn find_line(content: &str, re: &Regex) -> Option<usize> {
    content.lines().position(|l| re.is_match(l)).map(|i| i + 1)
}

fn find_line_literal(content: &str, needle: &str) -> Option<usize> {
    content.lines().position(|l| l.contains(needle)).map(|i| i + 1)
}

fn violation(
    path: &Path,
    line: Option<usize>,
    rule_id: &str,
    message: &str,
    severity: Severity,
) -> ContractViolation {
    ContractViolation {
        rule_id: rule_id.to_string(),
        file: path.display().to_string(),
        line,
        message: message.to_string(),
        severity,
    }
}
