//! Tool table access from the command line

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;

use runledger_common::{RunledgerConfig, ToolContext, ToolRegistry};

use crate::output::{print_list, print_value, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum ToolsCommands {
    /// List available tools
    List,

    /// Invoke a tool once
    Call {
        /// Tool name
        name: String,

        /// JSON arguments
        #[arg(long, default_value = "{}")]
        input: String,
    },
}

#[derive(Serialize)]
struct ToolDisplay {
    name: String,
    description: String,
    input: serde_json::Value,
}

impl TableDisplay for ToolDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Description", "Required"]
    }

    fn row(&self) -> Vec<String> {
        let required = self.input["required"]
            .as_array()
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|f| f.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        vec![self.name.clone(), self.description.clone(), required]
    }
}

pub fn execute(cmd: ToolsCommands, config: &RunledgerConfig, format: OutputFormat) -> Result<()> {
    let registry = ToolRegistry::new();

    match cmd {
        ToolsCommands::List => {
            let tools: Vec<ToolDisplay> = registry
                .iter()
                .map(|(name, tool)| ToolDisplay {
                    name: name.to_string(),
                    description: tool.description.to_string(),
                    input: tool.input_schema.clone(),
                })
                .collect();
            print_list(&tools, format);
        }
        ToolsCommands::Call { name, input } => {
            let arguments: serde_json::Value =
                serde_json::from_str(&input).context("--input must be valid JSON")?;
            let ctx = ToolContext::new(config.clone());
            let result = registry.call(&ctx, &name, arguments)?;
            print_value(&result, format);
        }
    }
    Ok(())
}
