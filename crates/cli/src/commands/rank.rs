//! Selector ranking

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use runledger_common::{SelectorCandidate, SelectorRankingEngine, SelectorTier};

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct RankArgs {
    /// Selectors to score
    pub selectors: Vec<String>,

    /// Sort best-first instead of keeping input order
    #[arg(long)]
    pub sorted: bool,
}

fn tier_cell(tier: SelectorTier) -> String {
    match tier {
        SelectorTier::Excellent => tier.as_str().green().to_string(),
        SelectorTier::Good => tier.as_str().cyan().to_string(),
        SelectorTier::Acceptable => tier.as_str().yellow().to_string(),
        SelectorTier::Poor => tier.as_str().red().to_string(),
    }
}

impl TableDisplay for SelectorCandidate {
    fn headers() -> Vec<&'static str> {
        vec![
            "Selector",
            "Score",
            "Tier",
            "Stability",
            "Specificity",
            "Maintainability",
            "Performance",
        ]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.selector.clone(),
            format!("{:.1}", self.score),
            tier_cell(self.tier),
            format!("{:.0}", self.factors.stability),
            format!("{:.0}", self.factors.specificity),
            format!("{:.0}", self.factors.maintainability),
            format!("{:.0}", self.factors.performance),
        ]
    }
}

fn rank(args: &RankArgs) -> Vec<SelectorCandidate> {
    let engine = SelectorRankingEngine::new();
    if args.sorted {
        engine.rank_sorted(&args.selectors)
    } else {
        engine.rank(&args.selectors)
    }
}

pub fn execute(args: RankArgs, format: OutputFormat) -> Result<()> {
    print_list(&rank(&args), format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_ranks_to_empty_list() {
        let args = RankArgs {
            selectors: Vec::new(),
            sorted: true,
        };
        assert!(rank(&args).is_empty());
        execute(args, OutputFormat::Json).unwrap();
    }

    #[test]
    fn test_keeps_input_order_unless_sorted() {
        let selectors = vec!["#a".to_string(), "[data-testid=\"b\"]".to_string()];
        let unsorted = rank(&RankArgs {
            selectors: selectors.clone(),
            sorted: false,
        });
        assert_eq!(unsorted[0].selector, "#a");

        let sorted = rank(&RankArgs {
            selectors,
            sorted: true,
        });
        assert_eq!(sorted[0].selector, "[data-testid=\"b\"]");
    }
}
