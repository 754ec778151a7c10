//! Selector healing
//!
//! When a locator stops resolving, a [`SelectorHealer`] proposes a
//! replacement from a snapshot of the page. [`HeuristicHealer`] finds the
//! elements the broken selector most likely meant, derives a locator per
//! strategy for each, and lets [`SelectorRankingEngine`] pick the winner.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::selector::{SelectorRankingEngine, SelectorStrategy, SelectorTier};

/// DOM snapshot captured at failure time
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub elements: Vec<PageElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PageElement {
    pub tag_name: String,
    pub id: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub text_content: Option<String>,
    pub role: Option<String>,
    pub aria_label: Option<String>,
    pub data_test_id: Option<String>,
    pub css_path: Option<String>,
    pub xpath: Option<String>,
    pub children: Vec<PageElement>,
}

impl PageElement {
    fn test_id(&self) -> Option<&str> {
        self.data_test_id
            .as_deref()
            .or_else(|| self.attributes.get("data-testid").map(String::as_str))
    }

    fn label(&self) -> Option<&str> {
        self.aria_label
            .as_deref()
            .or_else(|| self.attributes.get("aria-label").map(String::as_str))
    }

    fn text(&self) -> Option<&str> {
        self.text_content
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Values the broken selector might have referred to
    fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = [self.id.as_deref(), self.test_id(), self.label(), self.text()]
            .into_iter()
            .flatten()
            .collect();
        for key in ["name", "placeholder", "class"] {
            if let Some(value) = self.attributes.get(key) {
                ids.extend(value.split_whitespace());
            }
        }
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeSelector {
    pub selector: String,
    pub strategy: SelectorStrategy,
    pub confidence: f64,
    pub tier: SelectorTier,
}

/// One healing proposal. Appended to `healed-selectors.json` when accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorHealing {
    pub original_selector: String,
    pub healed_selector: String,
    pub confidence: f64,
    pub strategy: SelectorStrategy,
    pub reasoning: String,
    pub alternatives: Vec<AlternativeSelector>,
}

impl SelectorHealing {
    pub fn is_healed(&self) -> bool {
        self.healed_selector != self.original_selector
    }
}

pub trait SelectorHealer: Send + Sync {
    fn heal(
        &self,
        selector: &str,
        page: &PageSnapshot,
        error_message: Option<&str>,
    ) -> SelectorHealing;
}

/// Deterministic healer: token match against the snapshot, then ranking
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicHealer {
    engine: SelectorRankingEngine,
}

impl HeuristicHealer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectorHealer for HeuristicHealer {
    fn heal(
        &self,
        selector: &str,
        page: &PageSnapshot,
        error_message: Option<&str>,
    ) -> SelectorHealing {
        let token = selector_token(selector);
        let mut matched: Vec<(&PageElement, f64)> = Vec::new();
        if !token.is_empty() {
            walk(&page.elements, &mut |el| {
                if let Some(weight) = match_weight(el, &token) {
                    matched.push((el, weight));
                }
            });
        }

        // candidate -> match weight of the element it came from
        let mut candidates: Vec<(String, f64)> = Vec::new();
        for (el, weight) in &matched {
            for candidate in candidates_for(el) {
                if candidate != selector && !candidates.iter().any(|(c, _)| *c == candidate) {
                    candidates.push((candidate, *weight));
                }
            }
        }

        let names: Vec<&str> = candidates.iter().map(|(c, _)| c.as_str()).collect();
        let mut alternatives: Vec<AlternativeSelector> = self
            .engine
            .rank(&names)
            .into_iter()
            .zip(candidates.iter())
            .map(|(ranked, (_, weight))| AlternativeSelector {
                strategy: SelectorStrategy::detect(&ranked.selector),
                confidence: round2(ranked.score / 100.0 * weight),
                tier: ranked.tier,
                selector: ranked.selector,
            })
            .collect();
        alternatives.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let context = error_message
            .map(|e| format!(" after error: {}", e.lines().next().unwrap_or(e)))
            .unwrap_or_default();

        if alternatives.is_empty() {
            debug!("No healing candidate for {}", selector);
            return SelectorHealing {
                original_selector: selector.to_string(),
                healed_selector: selector.to_string(),
                confidence: 0.0,
                strategy: SelectorStrategy::detect(selector),
                reasoning: format!(
                    "No element in the page snapshot matches {:?}{}",
                    token, context
                ),
                alternatives,
            };
        }

        let best = alternatives.remove(0);
        debug!(
            "Healed {} -> {} ({:.2})",
            selector, best.selector, best.confidence
        );
        SelectorHealing {
            original_selector: selector.to_string(),
            reasoning: format!(
                "{} element(s) in the snapshot match {:?}; {} locator ranked highest ({}){}",
                matched.len(),
                token,
                strategy_name(best.strategy),
                best.tier,
                context
            ),
            healed_selector: best.selector,
            confidence: best.confidence,
            strategy: best.strategy,
            alternatives,
        }
    }
}

fn walk<'a>(elements: &'a [PageElement], visit: &mut dyn FnMut(&'a PageElement)) {
    for el in elements {
        visit(el);
        walk(&el.children, visit);
    }
}

/// 1.0 for an exact identifier match, 0.8 for a partial one
fn match_weight(el: &PageElement, token: &str) -> Option<f64> {
    let ids: Vec<String> = el.identifiers().iter().map(|i| i.to_lowercase()).collect();
    if ids.iter().any(|i| i == token) {
        Some(1.0)
    } else if ids.iter().any(|i| {
        (token.len() >= 3 && i.contains(token)) || (i.len() >= 3 && token.contains(i.as_str()))
    }) {
        Some(0.8)
    } else {
        None
    }
}

fn candidates_for(el: &PageElement) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(id) = el.test_id() {
        out.push(format!("[data-testid=\"{}\"]", id));
    }
    if let Some(role) = &el.role {
        match el.label().or_else(|| el.text()) {
            Some(name) => out.push(format!("role={}[name=\"{}\"]", role, name)),
            None => out.push(format!("role={}", role)),
        }
    }
    if let Some(label) = el.label() {
        out.push(format!("[aria-label=\"{}\"]", label));
    }
    if let Some(placeholder) = el.attributes.get("placeholder") {
        out.push(format!("[placeholder=\"{}\"]", placeholder));
    }
    if let Some(text) = el.text() {
        out.push(format!("text={}", text));
    }
    if let Some(id) = &el.id {
        out.push(format!("#{}", id));
    }
    if let Some(css) = &el.css_path {
        out.push(css.clone());
    }
    if let Some(xpath) = &el.xpath {
        out.push(xpath.clone());
    }
    out
}

/// The identifying part of a selector, lowercased: `#login-btn` gives
/// `login-btn`, `[data-testid="submit"]` gives `submit`, `text=Sign in`
/// gives `sign in`.
fn selector_token(selector: &str) -> String {
    let s = selector.trim();

    if let Some(start) = s.find('"').or_else(|| s.find('\'')) {
        let quote = &s[start..start + 1];
        if let Some(len) = s[start + 1..].find(quote) {
            return s[start + 1..start + 1 + len].trim().to_lowercase();
        }
    }

    for prefix in ["text=", "label=", "data-testid=", "role="] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return rest.trim().to_lowercase();
        }
    }

    let last = s.split_whitespace().last().unwrap_or("");
    let last = last.split(':').next().unwrap_or("");
    let last = last.rsplit(|c| c == '#' || c == '.').next().unwrap_or("");
    last.trim_matches(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .to_lowercase()
}

fn strategy_name(strategy: SelectorStrategy) -> &'static str {
    match strategy {
        SelectorStrategy::DataTestid => "data-testid",
        SelectorStrategy::Role => "role",
        SelectorStrategy::Label => "label",
        SelectorStrategy::Text => "text",
        SelectorStrategy::Placeholder => "placeholder",
        SelectorStrategy::Css => "css",
        SelectorStrategy::Xpath => "xpath",
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
