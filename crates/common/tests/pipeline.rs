use runledger_common::artifact::ROOT_CAUSE_SUMMARY;
use runledger_common::audit::EVENT_GOVERNANCE;
use runledger_common::config::{PolicyKind, CONFIG_FILE_NAME};
use runledger_common::{
    AuditTrail, Error, HistoryIndex, Pipeline, RunLayout, RunledgerConfig, ToolContext,
    ToolRegistry,
};
use serde_json::json;
use tempfile::TempDir;

fn config_in(tmp: &TempDir) -> RunledgerConfig {
    RunledgerConfig::load_from_base(tmp.path()).expect("load config")
}

/// Full pipeline over several runs sharing one history index
///
/// Two passing runs and one genuine failure. Every run must leave an audit
/// trail that verifies, and the failure must still produce its evidence.
#[test]
fn pipeline_runs_share_history_and_keep_evidence() {
    let tmp = TempDir::new().expect("tempdir");
    let pipeline = Pipeline::new(config_in(&tmp));

    pipeline.execute("alpha", 0).expect("alpha passes");
    pipeline.execute("beta", 0).expect("beta passes");

    let gamma = RunLayout::from_config(pipeline.config(), "gamma").expect("layout");
    std::fs::write(
        gamma.artifact_path(ROOT_CAUSE_SUMMARY),
        r#"{"category":"api_error","confidence":0.85,"isFlaky":false}"#,
    )
    .expect("write rca");

    let err = pipeline.execute("gamma", 1).expect_err("gamma fails the gate");
    assert!(matches!(err, Error::GovernanceFailure { exit_code: 1, .. }));
    assert_eq!(err.exit_code(), 1);

    let records = HistoryIndex::load(&gamma).expect("history");
    assert_eq!(records.len(), 3);
    let summary = HistoryIndex::summarize(&records);
    assert_eq!(summary.distinct_runs, 3);
    assert_eq!(summary.by_category.get("api_error"), Some(&1));
    assert_eq!(summary.by_category.get("none"), Some(&2));

    for run in ["alpha", "beta", "gamma"] {
        let layout = RunLayout::from_config(pipeline.config(), run).expect("layout");
        let chain = AuditTrail::verify(&layout).expect("verify");
        assert!(chain.valid, "{run} audit chain must verify");
        assert!(tmp.path().join("reports").join(format!("report-{run}.md")).is_file());
    }

    let events = AuditTrail::load(&gamma).expect("events");
    assert_eq!(events[0].event_type, EVENT_GOVERNANCE);
    assert_eq!(events[0].payload["passed"], false);
}

/// A stricter policy from runledger.toml changes the verdict on flaky runs
#[test]
fn configured_policy_is_applied() {
    let tmp = TempDir::new().expect("tempdir");
    std::fs::write(
        tmp.path().join(CONFIG_FILE_NAME),
        "[governance]\npolicy = \"confidence-threshold\"\nmin_flaky_confidence = 0.9\n",
    )
    .expect("write config");

    let config = config_in(&tmp);
    assert_eq!(config.governance.policy, PolicyKind::ConfidenceThreshold);
    let pipeline = Pipeline::new(config);

    let layout = RunLayout::from_config(pipeline.config(), "shaky").expect("layout");
    std::fs::write(
        layout.artifact_path(ROOT_CAUSE_SUMMARY),
        r#"{"category":"timeout","confidence":0.8,"isFlaky":true}"#,
    )
    .expect("write rca");

    let err = pipeline.execute("shaky", 1).expect_err("low-confidence flake fails");
    assert!(matches!(err, Error::GovernanceFailure { is_flaky: true, .. }));
}

/// The tool surface drives the same stages as the pipeline
#[test]
fn tools_drive_a_run_end_to_end() {
    let tmp = TempDir::new().expect("tempdir");
    let ctx = ToolContext::new(config_in(&tmp));
    let tools = ToolRegistry::new();

    let run = tools
        .call(&ctx, "createRun", json!({ "runName": "via-tools" }))
        .expect("createRun");
    assert_eq!(run["runName"], "via-tools");

    tools
        .call(
            &ctx,
            "classifyFailure",
            json!({
                "runName": "via-tools",
                "context": {
                    "errorMessage": "locator.click: Timeout 30000ms exceeded.",
                    "retryCount": 1
                }
            }),
        )
        .expect("classify");
    tools
        .call(&ctx, "generateArtifacts", json!({ "runName": "via-tools" }))
        .expect("generate");

    let verdict = tools
        .call(&ctx, "gate", json!({ "runName": "via-tools", "exitCode": 1 }))
        .expect("gate");
    assert_eq!(verdict["isFlaky"], true);
    assert_eq!(verdict["passed"], true);

    let record = tools
        .call(&ctx, "indexRun", json!({ "runName": "via-tools" }))
        .expect("index");
    assert_eq!(record["category"], "timeout");
}
