//! Line-delimited JSON tool server on stdio
//!
//! Each input line is a request `{"id", "tool", "arguments"}`; each output
//! line is `{"id", "result"}` or `{"id", "error": {"kind", "message"}}`.
//! Requests are handled one at a time in arrival order.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use runledger_common::{Error, RunledgerConfig, ToolContext, ToolRegistry};

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ErrorBody {
    kind: String,
    message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Response {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::UnknownTool(_) => "unknown_tool",
        Error::InvalidToolInput { .. } => "invalid_input",
        Error::RunNotFound(_) => "run_not_found",
        Error::InvalidRunName(_) => "invalid_run_name",
        Error::MissingArtifact { .. } => "missing_artifact",
        Error::InvalidArtifactFormat { .. } => "invalid_artifact_format",
        Error::GovernanceFailure { .. } => "governance_failure",
        Error::Io(_) | Error::Serialization(_) | Error::Config(_) => "internal",
    }
}

fn handle_line(registry: &ToolRegistry, ctx: &ToolContext, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return Response {
                id: Value::Null,
                result: None,
                error: Some(ErrorBody {
                    kind: "invalid_request".to_string(),
                    message: e.to_string(),
                }),
            }
        }
    };

    debug!(id = %request.id, "Tool request {}", request.tool);
    match registry.call(ctx, &request.tool, request.arguments) {
        Ok(result) => Response {
            id: request.id,
            result: Some(result),
            error: None,
        },
        Err(e) => {
            warn!("Tool {} failed: {}", request.tool, e);
            Response {
                id: request.id,
                result: None,
                error: Some(ErrorBody {
                    kind: error_kind(&e).to_string(),
                    message: e.to_string(),
                }),
            }
        }
    }
}

async fn serve_on<R, W>(config: &RunledgerConfig, input: R, mut output: W) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let registry = ToolRegistry::new();
    let ctx = ToolContext::new(config.clone());
    let mut lines = BufReader::new(input).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&registry, &ctx, &line);
        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        output.write_all(&encoded).await?;
        output.flush().await?;
    }
    Ok(())
}

pub async fn execute(config: &RunledgerConfig) -> Result<()> {
    info!("Serving tools on stdio");
    serve_on(config, tokio::io::stdin(), tokio::io::stdout()).await?;
    info!("Input closed, shutting down");
    Ok(())
}
