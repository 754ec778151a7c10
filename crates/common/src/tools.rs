//! Tool dispatch table
//!
//! Pipeline operations exposed to external callers by name. The table is
//! built once by [`ToolRegistry::new`]; every handler deserializes its input
//! into a typed struct and returns JSON.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::audit::AuditTrail;
use crate::classification::{FailureClassifier, FailureContext, RuleBasedClassifier};
use crate::config::RunledgerConfig;
use crate::contract::{self, TestStyle};
use crate::governance::GovernanceGate;
use crate::healing::{HeuristicHealer, PageSnapshot, SelectorHealer};
use crate::history::HistoryIndex;
use crate::layout::{validate_run_name, RunLayout};
use crate::report::{ReportBundler, ReportFormat};
use crate::selector::SelectorRankingEngine;
use crate::{Error, Result};

/// Metadata file written into the run root by `createRun`
pub const RUN_METADATA_FILE: &str = "run.json";

pub type ToolHandler = fn(&ToolContext, Value) -> Result<Value>;

pub struct Tool {
    pub description: &'static str,
    pub input_schema: Value,
    pub handler: ToolHandler,
}

/// Shared state handed to every handler
pub struct ToolContext {
    pub config: RunledgerConfig,
    pub gate: GovernanceGate,
    pub classifier: Box<dyn FailureClassifier>,
    pub healer: Box<dyn SelectorHealer>,
}

impl ToolContext {
    pub fn new(config: RunledgerConfig) -> Self {
        let gate = GovernanceGate::from_config(&config.governance);
        Self {
            config,
            gate,
            classifier: Box::new(RuleBasedClassifier::new()),
            healer: Box::new(HeuristicHealer::new()),
        }
    }

    fn layout(&self, run_name: &str) -> Result<RunLayout> {
        RunLayout::from_config(&self.config, run_name)
    }

    /// Run root for an existing run, without creating anything
    fn existing_run_root(&self, run_name: &str) -> Result<PathBuf> {
        validate_run_name(run_name)?;
        let root = self
            .config
            .base_dir
            .join(&self.config.runs_dir)
            .join(run_name);
        if root.is_dir() {
            Ok(root)
        } else {
            Err(Error::RunNotFound(run_name.to_string()))
        }
    }
}

/// Persisted by `createRun`, returned by `getRun`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub run_id: String,
    pub run_name: String,
    pub style: TestStyle,
    pub created_at: String,
    pub layout: RunLayout,
}

pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Tool>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        let mut tools = BTreeMap::new();
        let mut add = |name: &'static str,
                       description: &'static str,
                       input_schema: Value,
                       handler: ToolHandler| {
            tools.insert(
                name,
                Tool {
                    description,
                    input_schema,
                    handler,
                },
            );
        };

        add(
            "listStyles",
            "List the supported test-authoring styles",
            schema(&[], &[]),
            list_styles,
        );
        add(
            "createRun",
            "Allocate a run directory and persist run metadata",
            schema(&[], &[("runName", "string"), ("style", "string")]),
            create_run,
        );
        add(
            "getRun",
            "Fetch the metadata of an existing run",
            schema(&[("runName", "string")], &[]),
            get_run,
        );
        add(
            "healSelector",
            "Propose a replacement for a broken selector from a page snapshot",
            schema(
                &[("selector", "string"), ("page", "object")],
                &[("runName", "string"), ("errorMessage", "string")],
            ),
            heal_selector,
        );
        add(
            "classifyFailure",
            "Classify a failed test from its collected context",
            schema(&[("context", "object")], &[("runName", "string")]),
            classify_failure,
        );
        add(
            "generateArtifacts",
            "Write default artifacts for a run where absent",
            schema(&[("runName", "string")], &[]),
            generate_artifacts,
        );
        add(
            "validateArtifacts",
            "Check a run's artifacts exist and parse",
            schema(&[("runName", "string")], &[]),
            validate_artifacts,
        );
        add(
            "rankSelectors",
            "Score candidate selectors for robustness",
            schema(&[("selectors", "array")], &[("sorted", "boolean")]),
            rank_selectors,
        );
        add(
            "validateArchitecture",
            "Check test files against the rules of a style",
            schema(&[("style", "string"), ("files", "array")], &[]),
            validate_architecture,
        );
        add(
            "gate",
            "Evaluate the governance gate for a run without raising",
            schema(&[("runName", "string"), ("exitCode", "integer")], &[]),
            gate,
        );
        add(
            "finalizeRun",
            "Append a finalize event to the run's audit trail",
            schema(&[("runName", "string")], &[]),
            finalize_run,
        );
        add(
            "indexRun",
            "Append the run's classification to the history index",
            schema(&[("runName", "string")], &[]),
            index_run,
        );
        add(
            "report",
            "Render the run report",
            schema(
                &[("runName", "string")],
                &[("outputDir", "string"), ("format", "string")],
            ),
            report,
        );

        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Tool)> {
        self.tools.iter().map(|(name, tool)| (*name, tool))
    }

    pub fn call(&self, ctx: &ToolContext, name: &str, input: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;
        debug!("Dispatching tool {}", name);
        (tool.handler)(ctx, input)
    }
}

fn schema(required: &[(&str, &str)], optional: &[(&str, &str)]) -> Value {
    let properties: serde_json::Map<String, Value> = required
        .iter()
        .chain(optional)
        .map(|(name, ty)| (name.to_string(), json!({ "type": ty })))
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
    })
}

fn parse<T: DeserializeOwned>(tool: &str, input: Value) -> Result<T> {
    let input = if input.is_null() { json!({}) } else { input };
    serde_json::from_value(input).map_err(|e| Error::InvalidToolInput {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunInput {
    run_name: String,
}

fn list_styles(_ctx: &ToolContext, _input: Value) -> Result<Value> {
    let styles: Vec<_> = TestStyle::ALL.iter().map(|s| s.descriptor()).collect();
    Ok(serde_json::to_value(styles)?)
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct CreateRunInput {
    run_name: Option<String>,
    style: Option<String>,
}

fn create_run(ctx: &ToolContext, input: Value) -> Result<Value> {
    let input: CreateRunInput = parse("createRun", input)?;
    let style_name = input.style.as_deref().unwrap_or(&ctx.config.runner.style);
    let style = TestStyle::parse(style_name).ok_or_else(|| Error::InvalidToolInput {
        tool: "createRun".to_string(),
        reason: format!("unknown style {:?}", style_name),
    })?;

    let run_id = Uuid::new_v4();
    let run_name = input
        .run_name
        .unwrap_or_else(|| format!("run-{}", &run_id.simple().to_string()[..8]));
    let layout = ctx.layout(&run_name)?;
    let path = layout.run_root.join(RUN_METADATA_FILE);

    let metadata = RunMetadata {
        run_id: run_id.to_string(),
        run_name: run_name.clone(),
        style,
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        layout,
    };

    match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
            file.write_all(serde_json::to_string_pretty(&metadata)?.as_bytes())?;
            info!("Created run {} ({})", run_name, metadata.run_id);
            Ok(serde_json::to_value(metadata)?)
        }
        // an existing run keeps its original metadata
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            debug!("Run {} already exists", run_name);
            get_run(ctx, json!({ "runName": run_name }))
        }
        Err(e) => Err(e.into()),
    }
}

fn get_run(ctx: &ToolContext, input: Value) -> Result<Value> {
    let input: RunInput = parse("getRun", input)?;
    let path = ctx.existing_run_root(&input.run_name)?.join(RUN_METADATA_FILE);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::RunNotFound(input.run_name))
        }
        Err(e) => return Err(e.into()),
    };
    let metadata: RunMetadata =
        serde_json::from_str(&raw).map_err(|e| Error::InvalidArtifactFormat {
            name: RUN_METADATA_FILE.to_string(),
            path: path.clone(),
            reason: e.to_string(),
        })?;
    Ok(serde_json::to_value(metadata)?)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealInput {
    selector: String,
    page: PageSnapshot,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    run_name: Option<String>,
}

fn heal_selector(ctx: &ToolContext, input: Value) -> Result<Value> {
    let input: HealInput = parse("healSelector", input)?;
    let healing = ctx
        .healer
        .heal(&input.selector, &input.page, input.error_message.as_deref());

    let healing_config = &ctx.config.healing;
    let accepted = healing_config.enabled
        && healing.is_healed()
        && healing.confidence >= healing_config.confidence_threshold;

    let recorded = match (&input.run_name, accepted) {
        (Some(run_name), true) => {
            let layout = ctx.layout(run_name)?;
            ArtifactStore::append_healing(&layout, &healing)?;
            true
        }
        _ => false,
    };

    Ok(json!({ "healing": healing, "accepted": accepted, "recorded": recorded }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyInput {
    context: FailureContext,
    #[serde(default)]
    run_name: Option<String>,
}

fn classify_failure(ctx: &ToolContext, input: Value) -> Result<Value> {
    let input: ClassifyInput = parse("classifyFailure", input)?;
    let classification = ctx.classifier.classify(&input.context);

    if let Some(run_name) = &input.run_name {
        let layout = ctx.layout(run_name)?;
        ArtifactStore::write_classification(&layout, &classification)?;
    }
    Ok(serde_json::to_value(classification)?)
}

fn generate_artifacts(ctx: &ToolContext, input: Value) -> Result<Value> {
    let input: RunInput = parse("generateArtifacts", input)?;
    let created = ArtifactStore::ensure_defaults(&ctx.layout(&input.run_name)?)?;
    Ok(json!({ "runName": input.run_name, "created": created }))
}

fn validate_artifacts(ctx: &ToolContext, input: Value) -> Result<Value> {
    let input: RunInput = parse("validateArtifacts", input)?;
    ArtifactStore::validate(&ctx.layout(&input.run_name)?)?;
    Ok(json!({ "runName": input.run_name, "valid": true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RankInput {
    selectors: Vec<String>,
    #[serde(default)]
    sorted: bool,
}

fn rank_selectors(_ctx: &ToolContext, input: Value) -> Result<Value> {
    let input: RankInput = parse("rankSelectors", input)?;
    let engine = SelectorRankingEngine::new();
    let ranked = if input.sorted {
        engine.rank_sorted(&input.selectors)
    } else {
        engine.rank(&input.selectors)
    };
    Ok(serde_json::to_value(ranked)?)
}

#[derive(Deserialize)]
struct ArchitectureInput {
    style: String,
    files: Vec<PathBuf>,
}

fn validate_architecture(ctx: &ToolContext, input: Value) -> Result<Value> {
    let input: ArchitectureInput = parse("validateArchitecture", input)?;
    let style = TestStyle::parse(&input.style).ok_or_else(|| Error::InvalidToolInput {
        tool: "validateArchitecture".to_string(),
        reason: format!("unknown style {:?}", input.style),
    })?;
    let files: Vec<PathBuf> = input
        .files
        .iter()
        .map(|f| ctx.config.base_dir.join(f))
        .collect();
    Ok(serde_json::to_value(contract::validate_files(style, &files)?)?)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GateInput {
    run_name: String,
    exit_code: i32,
}

fn gate(ctx: &ToolContext, input: Value) -> Result<Value> {
    let input: GateInput = parse("gate", input)?;
    let verdict = ctx.gate.evaluate(&ctx.layout(&input.run_name)?, input.exit_code);
    Ok(serde_json::to_value(verdict)?)
}

fn finalize_run(ctx: &ToolContext, input: Value) -> Result<Value> {
    let input: RunInput = parse("finalizeRun", input)?;
    let summary = AuditTrail::finalize(&ctx.layout(&input.run_name)?, &input.run_name)?;
    Ok(serde_json::to_value(summary)?)
}

fn index_run(ctx: &ToolContext, input: Value) -> Result<Value> {
    let input: RunInput = parse("indexRun", input)?;
    let record = HistoryIndex::append(&ctx.layout(&input.run_name)?, &input.run_name)?;
    Ok(serde_json::to_value(record)?)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportInput {
    run_name: String,
    #[serde(default)]
    output_dir: Option<PathBuf>,
    #[serde(default)]
    format: ReportFormat,
}

fn report(ctx: &ToolContext, input: Value) -> Result<Value> {
    let input: ReportInput = parse("report", input)?;
    let output_dir = match input.output_dir {
        Some(dir) => ctx.config.base_dir.join(dir),
        None => ctx.config.reports_path(),
    };
    let path = ReportBundler::render_as(
        &ctx.layout(&input.run_name)?,
        &input.run_name,
        &output_dir,
        input.format,
    )?;
    Ok(json!({ "runName": input.run_name, "path": path }))
}
