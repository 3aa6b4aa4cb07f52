//! Serve command handler.
//!
//! Reads one JSON request per line from stdin and writes one JSON response
//! per line to stdout. Logs go to stderr so stdout carries only responses.
//!
//! Requests:
//! - `{"tool": "...", "arguments": {...}, "confirmed": false}` runs a tool
//!   and answers with the invocation result
//! - `{"op": "tools"}` lists every reachable tool
//! - `{"op": "reload"}` re-reads configuration and reconciles servers

use anyhow::Result;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use toolgate_core::{InvocationRequest, InvocationResult};

use crate::bootstrap::CliContext;

/// Execute the serve command until stdin closes.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    tracing::info!("Serving tool requests on stdin");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(ctx, &line).await;
        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.flush().await?;
    }
    tracing::info!("stdin closed, stopping");

    Ok(())
}

/// Answer a single request line.
pub async fn handle_line(ctx: &CliContext, line: &str) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return to_json(&InvocationResult::error(format!("Invalid request: {e}"))),
    };

    if let Some(op) = request.get("op").and_then(Value::as_str) {
        return match op {
            "tools" => json!({ "tools": to_json(&ctx.gateway().tools()) }),
            "reload" => match ctx.reload().await {
                Ok(report) => json!({ "reloaded": to_json(&report) }),
                Err(e) => to_json(&InvocationResult::error(format!("Reload failed: {e:#}"))),
            },
            other => to_json(&InvocationResult::error(format!("Unknown op '{other}'"))),
        };
    }

    match serde_json::from_value::<InvocationRequest>(request) {
        Ok(request) => to_json(&ctx.gateway().handle(request).await),
        Err(e) => to_json(&InvocationResult::error(format!("Invalid request: {e}"))),
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        json!({ "success": false, "error": format!("Failed to encode response: {e}") })
    })
}
