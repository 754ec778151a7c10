//! Selector ranking
//!
//! Scores candidate locators on four fixed rules and combines them into an
//! overall score and a recommendation tier. Ranking is a pure function: no
//! I/O, no shared state, and identical input always yields identical output,
//! so it can be called from any thread without coordination.

use serde::{Deserialize, Serialize};

const TEST_ID_MARKER: &str = "[data-testid=";

const WEIGHT_STABILITY: f64 = 0.40;
const WEIGHT_SPECIFICITY: f64 = 0.20;
const WEIGHT_MAINTAINABILITY: f64 = 0.25;
const WEIGHT_PERFORMANCE: f64 = 0.15;

/// Recommendation tier derived from the overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorTier {
    Poor,
    Acceptable,
    Good,
    Excellent,
}

impl SelectorTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            SelectorTier::Excellent
        } else if score >= 70.0 {
            SelectorTier::Good
        } else if score >= 50.0 {
            SelectorTier::Acceptable
        } else {
            SelectorTier::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorTier::Excellent => "excellent",
            SelectorTier::Good => "good",
            SelectorTier::Acceptable => "acceptable",
            SelectorTier::Poor => "poor",
        }
    }
}

impl std::fmt::Display for SelectorTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-factor scores, each in `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectorFactors {
    pub stability: f64,
    pub specificity: f64,
    pub maintainability: f64,
    pub performance: f64,
}

impl SelectorFactors {
    pub fn weighted_score(&self) -> f64 {
        self.stability * WEIGHT_STABILITY
            + self.specificity * WEIGHT_SPECIFICITY
            + self.maintainability * WEIGHT_MAINTAINABILITY
            + self.performance * WEIGHT_PERFORMANCE
    }
}

/// A scored locator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorCandidate {
    pub selector: String,
    pub factors: SelectorFactors,
    pub score: f64,
    pub tier: SelectorTier,
}

/// Locator strategy a selector string is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorStrategy {
    DataTestid,
    Role,
    Label,
    Text,
    Placeholder,
    Css,
    Xpath,
}

impl SelectorStrategy {
    pub fn detect(selector: &str) -> Self {
        let s = selector.trim();
        if s.contains(TEST_ID_MARKER) || s.starts_with("data-testid=") {
            SelectorStrategy::DataTestid
        } else if s.starts_with("role=") {
            SelectorStrategy::Role
        } else if s.contains("[aria-label=") || s.starts_with("label=") {
            SelectorStrategy::Label
        } else if s.starts_with("text=") {
            SelectorStrategy::Text
        } else if s.contains("[placeholder=") {
            SelectorStrategy::Placeholder
        } else if s.starts_with("//") || s.starts_with("xpath=") {
            SelectorStrategy::Xpath
        } else {
            SelectorStrategy::Css
        }
    }
}

/// Stateless ranking engine
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorRankingEngine;

impl SelectorRankingEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score every selector, preserving input order
    pub fn rank<S: AsRef<str>>(&self, selectors: &[S]) -> Vec<SelectorCandidate> {
        selectors.iter().map(|s| self.score(s.as_ref())).collect()
    }

    /// Rank and sort best-first. Ties keep input order.
    pub fn rank_sorted<S: AsRef<str>>(&self, selectors: &[S]) -> Vec<SelectorCandidate> {
        let mut ranked = self.rank(selectors);
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }

    pub fn score(&self, selector: &str) -> SelectorCandidate {
        let factors = SelectorFactors {
            stability: stability(selector),
            specificity: specificity(selector),
            maintainability: maintainability(selector),
            performance: performance(selector),
        };
        let score = factors.weighted_score();

        SelectorCandidate {
            selector: selector.to_string(),
            factors,
            score,
            tier: SelectorTier::from_score(score),
        }
    }
}

fn stability(selector: &str) -> f64 {
    if selector.contains(TEST_ID_MARKER) {
        100.0
    } else if selector.starts_with("role=") {
        90.0
    } else if selector.contains("[aria-label=") {
        80.0
    } else if selector.starts_with("text=") {
        70.0
    } else if selector.starts_with('.') {
        40.0
    } else if selector.starts_with('#') {
        30.0
    } else if selector.contains("nth-child") {
        20.0
    } else {
        50.0
    }
}

// Segments are space-separated parts; every extra combinator step costs 10.
fn specificity(selector: &str) -> f64 {
    let segments = selector.split(' ').count() as f64;
    (100.0 - segments * 10.0).max(0.0)
}

fn maintainability(selector: &str) -> f64 {
    if selector.contains(TEST_ID_MARKER) {
        return 100.0;
    }
    match selector.chars().count() {
        n if n < 50 => 80.0,
        n if n < 100 => 60.0,
        _ => 40.0,
    }
}

fn performance(selector: &str) -> f64 {
    if selector.starts_with('#') {
        100.0
    } else if selector.contains(TEST_ID_MARKER) {
        90.0
    } else if selector.starts_with('.') {
        70.0
    } else if selector.contains("//") {
        30.0
    } else {
        60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn one(selector: &str) -> SelectorCandidate {
        SelectorRankingEngine::new().score(selector)
    }

    #[test]
    fn test_data_testid_is_excellent() {
        let c = one(r#"[data-testid="x"]"#);
        assert_eq!(c.factors.stability, 100.0);
        assert_eq!(c.factors.specificity, 90.0);
        assert_eq!(c.factors.maintainability, 100.0);
        assert_eq!(c.factors.performance, 90.0);
        assert!((c.score - 96.5).abs() < 1e-9);
        assert_eq!(c.tier, SelectorTier::Excellent);
    }

    #[test]
    fn test_id_selector_ranks_below_test_id() {
        let ranked = SelectorRankingEngine::new().rank(&["#id", r#"[data-testid="x"]"#]);
        assert_eq!(ranked[0].factors.stability, 30.0);
        assert!(ranked[0].factors.stability < ranked[1].factors.stability);
        assert!(ranked[0].score < ranked[1].score);
        assert_eq!(ranked[0].tier, SelectorTier::Acceptable);
    }

    #[test_case("role=button[name=\"Save\"]", 90.0 ; "role")]
    #[test_case("button[aria-label=\"Close\"]", 80.0 ; "aria label")]
    #[test_case("text=Sign in", 70.0 ; "text")]
    #[test_case(".btn-primary", 40.0 ; "class")]
    #[test_case("#submit", 30.0 ; "id")]
    #[test_case("ul > li:nth-child(3)", 20.0 ; "positional")]
    #[test_case("button", 50.0 ; "unmatched")]
    fn test_stability_rules(selector: &str, expected: f64) {
        assert_eq!(one(selector).factors.stability, expected);
    }

    #[test]
    fn test_specificity_penalizes_segments() {
        assert_eq!(one("form").factors.specificity, 90.0);
        assert_eq!(one("form div button").factors.specificity, 70.0);
        let long = vec!["div"; 12].join(" ");
        assert_eq!(one(&long).factors.specificity, 0.0);
    }

    #[test]
    fn test_maintainability_by_length() {
        assert_eq!(one(&"a".repeat(49)).factors.maintainability, 80.0);
        assert_eq!(one(&"a".repeat(50)).factors.maintainability, 60.0);
        assert_eq!(one(&"a".repeat(100)).factors.maintainability, 40.0);
    }

    #[test_case("#main", 100.0 ; "id")]
    #[test_case(".nav", 70.0 ; "class")]
    #[test_case("//div[@id='x']", 30.0 ; "xpath")]
    #[test_case("text=Go", 60.0 ; "other")]
    fn test_performance_rules(selector: &str, expected: f64) {
        assert_eq!(one(selector).factors.performance, expected);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(SelectorTier::from_score(85.0), SelectorTier::Excellent);
        assert_eq!(SelectorTier::from_score(84.99), SelectorTier::Good);
        assert_eq!(SelectorTier::from_score(70.0), SelectorTier::Good);
        assert_eq!(SelectorTier::from_score(50.0), SelectorTier::Acceptable);
        assert_eq!(SelectorTier::from_score(49.9), SelectorTier::Poor);
    }

    #[test]
    fn test_empty_input() {
        let empty: [&str; 0] = [];
        assert!(SelectorRankingEngine::new().rank(&empty).is_empty());
    }

    #[test]
    fn test_rank_is_deterministic_and_order_preserving() {
        let input = ["#a", ".b c", "text=d", "//e"];
        let engine = SelectorRankingEngine::new();
        let first = serde_json::to_vec(&engine.rank(&input)).unwrap();
        let second = serde_json::to_vec(&engine.rank(&input)).unwrap();
        assert_eq!(first, second);

        let ranked = engine.rank(&input);
        let order: Vec<_> = ranked.iter().map(|c| c.selector.as_str()).collect();
        assert_eq!(order, input);
    }

    #[test]
    fn test_rank_sorted_best_first() {
        let ranked = SelectorRankingEngine::new().rank_sorted(&["#a", r#"[data-testid="b"]"#]);
        assert_eq!(ranked[0].selector, r#"[data-testid="b"]"#);
    }

    #[test]
    fn test_strategy_detection() {
        assert_eq!(SelectorStrategy::detect(r#"[data-testid="x"]"#), SelectorStrategy::DataTestid);
        assert_eq!(SelectorStrategy::detect("role=link"), SelectorStrategy::Role);
        assert_eq!(SelectorStrategy::detect("//a"), SelectorStrategy::Xpath);
        assert_eq!(SelectorStrategy::detect("#x"), SelectorStrategy::Css);
    }
}
